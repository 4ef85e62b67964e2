use sqlx::SqlitePool;

use crate::entity::EntityMeta;
use crate::error::QuarryResult;
use crate::session::{Session, SessionOptions};
use crate::Quarry;

/// Lightweight test helper owning a private in-memory database.
pub struct TestDatabase {
    pool: SqlitePool,
}

impl TestDatabase {
    pub async fn sqlite() -> QuarryResult<Self> {
        let pool = Quarry::sqlite_pool("sqlite::memory:").await?;
        Ok(Self { pool })
    }

    /// In-memory database with a table for every entity, in the order given.
    pub async fn with_schema(metas: &[&'static EntityMeta]) -> QuarryResult<Self> {
        let db = Self::sqlite().await?;
        Quarry::create_schema(&db.pool, metas).await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn into_pool(self) -> SqlitePool {
        self.pool
    }

    pub async fn session(&self) -> QuarryResult<Session> {
        Session::begin(&self.pool).await
    }

    pub async fn session_with(&self, options: SessionOptions) -> QuarryResult<Session> {
        Session::begin_with(&self.pool, options).await
    }
}
