mod hello;
mod member;
mod team;

pub use hello::{Hello, QHello};
pub use member::{Member, QMember};
pub use team::{QTeam, Team};
