//! Member/Team study model for the Quarry query builder.
//!
//! `tests/querydsl_basic.rs` holds the study queries; the binary runs a few
//! of them against an in-memory database and prints the results.

pub mod config;
pub mod dto;
pub mod entity;
pub mod fixture;

use quarry_core::{Entity, Quarry, QuarryResult};
use sqlx::SqlitePool;

pub use dto::{MemberDto, UserDto};
pub use entity::{Hello, Member, QHello, QMember, QTeam, Team};

/// Creates `team`, `member` and `hello`; `team` first so the foreign key resolves.
pub async fn create_schema(pool: &SqlitePool) -> QuarryResult<()> {
    Quarry::create_schema(pool, &[Team::meta(), Member::meta(), Hello::meta()]).await
}
