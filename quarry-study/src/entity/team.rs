use std::fmt;

use quarry_core::{Entity, QuarryResult, QueryFactory};

use super::{Member, QMember};

/// A team. Its members are read back through `member.team_id`; the team
/// itself stores nothing about them.
#[derive(Debug, Clone, PartialEq, Entity)]
#[quarry(table = "team", has_many(name = "members", target = Member, column = "team_id"))]
pub struct Team {
    #[quarry(id, column = "team_id")]
    id: Option<i64>,
    name: String,
}

impl Team {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_owned(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members referencing this team, in identity order.
    pub async fn members(&self, query: &QueryFactory<'_>) -> QuarryResult<Vec<Member>> {
        let Some(id) = self.id else {
            return Ok(Vec::new());
        };
        let member = QMember::member();
        query
            .select_from(&member)
            .filter(member.team.id().eq(id))
            .order_by(member.id.asc())
            .fetch()
            .await
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "Team(id={}, name={})", id, self.name),
            None => write!(f, "Team(id=null, name={})", self.name),
        }
    }
}
