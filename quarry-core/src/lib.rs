//! Typed query paths, SQL rendering and a unit-of-work session on top of sqlx.
//!
//! Entities derive [`Entity`], which also generates a `Q*` path type with one
//! typed expression per column. A [`Session`] owns one transaction and the
//! identity map; [`QueryFactory`] builds [`Query`] values against it.

extern crate self as quarry_core;

pub use quarry_macros::{Entity, Projection};
pub use sqlx;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

pub mod case;
pub mod dialect;
pub mod entity;
pub mod error;
mod executor;
pub mod expr;
pub mod factory;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod path;
pub mod projection;
pub mod query;
pub mod schema;
pub mod session;
pub mod sql;
mod sql_cache;
pub mod subquery;
pub mod test_utils;
pub mod value;

pub use case::CaseBuilder;
pub use dialect::SqlDialect;
pub use entity::{ColumnMeta, Entity, EntityMeta, IdentityMap, LazyRef, SqlType};
pub use error::{QuarryError, QuarryResult};
pub use expr::{Expr, Expressions, NullsOrder, Numeric, Operand, OrderSpecifier, Predicate};
pub use factory::QueryFactory;
pub use path::{EntityPath, JoinPath, ManyToOne, OneToMany};
pub use projection::{
    BeanTarget, ConstructorTarget, EntityProjection, FieldTarget, IntoProjection, IntoTuple,
    Projection, Projections, SelectItem, Tuple, TupleItem,
};
pub use query::{Query, QueryResults};
pub use schema::{SchemaColumn, SchemaForeignKey, SchemaTable, create_table_sql, introspect_sqlite_schema};
pub use session::{FlushMode, Session, SessionOptions};
pub use subquery::SubQuery;
pub use value::{FromValue, Value, ValueReader};

pub mod prelude {
    pub use crate::{
        CaseBuilder, Entity, EntityPath, Expr, Expressions, FlushMode, LazyRef, Predicate,
        Projection, Projections, Quarry, QuarryError, QuarryResult, QueryFactory, Session,
        SubQuery, Tuple,
    };
}

pub struct Quarry;

impl Quarry {
    /// Pool with foreign keys enforced and the database file created on demand.
    pub async fn sqlite_pool(url: &str) -> QuarryResult<SqlitePool> {
        Self::sqlite_pool_with(url, 5).await
    }

    /// In-memory databases live as long as their connection, so they get
    /// exactly one connection that never expires.
    pub async fn sqlite_pool_with(url: &str, max_connections: u32) -> QuarryResult<SqlitePool> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections)
        };
        tracing::debug!(url, in_memory, "quarry pool");
        Ok(pool.connect_with(options).await?)
    }

    pub async fn sync<E: Entity>(pool: &SqlitePool) -> QuarryResult<()> {
        Self::create_schema(pool, &[E::meta()]).await
    }

    /// Creates every table, in order; referenced tables must come first.
    pub async fn create_schema(pool: &SqlitePool, metas: &[&'static EntityMeta]) -> QuarryResult<()> {
        for meta in metas {
            let sql = create_table_sql::<sqlx::Sqlite>(meta);
            tracing::debug!(table = meta.table, sql = %sql, "quarry schema");
            sqlx::query(&sql).execute(pool).await?;
        }
        Ok(())
    }
}
