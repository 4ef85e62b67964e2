use quarry_core::{QuarryResult, Session};

use crate::entity::{Member, Team};

/// The shared test data: two teams with two members each.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub team_a: Team,
    pub team_b: Team,
    pub members: Vec<Member>,
}

/// Persists `teamA`, `teamB` and `member1`..`member4` (ages 10 to 40).
///
/// Nothing is flushed; the first query does that.
pub async fn seed(session: &Session) -> QuarryResult<Fixture> {
    let mut team_a = Team::new("teamA");
    let mut team_b = Team::new("teamB");
    session.persist(&mut team_a).await?;
    session.persist(&mut team_b).await?;

    let mut members = vec![
        Member::with_team("member1", 10, &team_a)?,
        Member::with_team("member2", 20, &team_a)?,
        Member::with_team("member3", 30, &team_b)?,
        Member::with_team("member4", 40, &team_b)?,
    ];
    for member in &mut members {
        session.persist(member).await?;
    }

    tracing::debug!(teams = 2, members = members.len(), "fixture seeded");
    Ok(Fixture {
        team_a,
        team_b,
        members,
    })
}
