use std::fmt;

use quarry_core::{Entity, LazyRef, QuarryError, QuarryResult};

use super::Team;

/// A member, optionally belonging to one team. The foreign key lives here.
#[derive(Debug, Clone, PartialEq, Entity)]
#[quarry(table = "member")]
pub struct Member {
    #[quarry(id, column = "member_id")]
    id: Option<i64>,
    username: Option<String>,
    age: i32,
    #[quarry(many_to_one, column = "team_id")]
    team: Option<LazyRef<Team>>,
}

impl Member {
    pub fn new(username: &str, age: i32) -> Self {
        Self {
            id: None,
            username: Some(username.to_owned()),
            age,
            team: None,
        }
    }

    /// A member with age 0 and no team.
    pub fn named(username: &str) -> Self {
        Self::new(username, 0)
    }

    pub fn without_username(age: i32) -> Self {
        Self {
            id: None,
            username: None,
            age,
            team: None,
        }
    }

    /// Fails with `TransientEntity` unless `team` was persisted first.
    pub fn with_team(username: &str, age: i32, team: &Team) -> QuarryResult<Self> {
        let mut member = Self::new(username, age);
        member.change_team(team)?;
        Ok(member)
    }

    /// Only for members not yet persisted: the session keeps no track of
    /// changes made after `persist`.
    pub fn change_team(&mut self, team: &Team) -> QuarryResult<()> {
        if let Some(id) = self.id {
            return Err(QuarryError::InvalidQuery(format!(
                "member {} is already persisted; its team can no longer change",
                id
            )));
        }
        self.team = Some(LazyRef::to(team)?);
        Ok(())
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn age(&self) -> i32 {
        self.age
    }

    pub fn team(&self) -> Option<&LazyRef<Team>> {
        self.team.as_ref()
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Member(id={}, username={}, age={})",
            self.id.map_or_else(|| "null".to_owned(), |id| id.to_string()),
            self.username.as_deref().unwrap_or("null"),
            self.age
        )
    }
}
