use std::collections::{HashMap, VecDeque};

use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::{Sqlite, Transaction};
use tokio::sync::{Mutex, MutexGuard};

use crate::dialect::SqlDialect;
use crate::entity::{Entity, EntityMeta, IdentityMap, load_entity};
use crate::error::{QuarryError, QuarryResult};
use crate::executor;
use crate::factory::QueryFactory;
use crate::projection::entity_columns;
use crate::sql_cache::cached_insert_sql;
use crate::value::{FromValue, Value};

/// When queued writes reach the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Before every query issued through the session, and on commit.
    #[default]
    Auto,
    /// Only on an explicit `flush` or on commit.
    Commit,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    pub flush_mode: FlushMode,
}

struct PendingInsert {
    meta: &'static EntityMeta,
    values: Vec<Value>,
}

pub(crate) struct SessionState {
    tx: Option<Transaction<'static, Sqlite>>,
    pub(crate) identity_map: IdentityMap,
    pending: VecDeque<PendingInsert>,
    sequences: HashMap<&'static str, i64>,
    flush_mode: FlushMode,
    statements: u64,
}

impl SessionState {
    pub(crate) fn conn(&mut self) -> QuarryResult<&mut SqliteConnection> {
        self.tx.as_deref_mut().ok_or(QuarryError::SessionClosed)
    }

    /// Split borrow for decoding while the connection is still in use.
    pub(crate) fn parts(&mut self) -> QuarryResult<(&mut SqliteConnection, &mut IdentityMap)> {
        let conn = self.tx.as_deref_mut().ok_or(QuarryError::SessionClosed)?;
        Ok((conn, &mut self.identity_map))
    }

    pub(crate) fn count_statement(&mut self) {
        self.statements += 1;
    }

    async fn next_id(&mut self, meta: &'static EntityMeta) -> QuarryResult<i64> {
        if !self.sequences.contains_key(meta.table) {
            let sql = format!(
                "SELECT COALESCE(MAX({}), 0) FROM {}",
                Sqlite::quote_identifier(meta.id_column),
                Sqlite::quote_identifier(meta.table)
            );
            let rows =
                executor::fetch_values(self.conn()?, "sequence", meta.table, &sql, Vec::new()).await?;
            self.statements += 1;
            let current = rows
                .into_iter()
                .next()
                .and_then(|row| row.into_iter().next())
                .map_or(Ok(0), i64::from_value)?;
            self.sequences.insert(meta.table, current);
        }
        let sequence = self.sequences.entry(meta.table).or_insert(0);
        *sequence += 1;
        Ok(*sequence)
    }

    #[tracing::instrument(skip(self), fields(pending = self.pending.len()))]
    pub(crate) async fn flush(&mut self) -> QuarryResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        // A failed insert stays at the front with everything queued after it.
        while let Some(insert) = self.pending.front() {
            let meta = insert.meta;
            let values = insert.values.clone();
            let sql = cached_insert_sql::<Sqlite>(meta);
            executor::execute(self.conn()?, "insert", meta.table, &sql, values).await?;
            self.statements += 1;
            self.pending.pop_front();
        }
        Ok(())
    }

    pub(crate) async fn auto_flush(&mut self) -> QuarryResult<()> {
        match self.flush_mode {
            FlushMode::Auto => self.flush().await,
            FlushMode::Commit => Ok(()),
        }
    }
}

/// Unit of work over one SQLite transaction.
///
/// Owns the identity map and the queue of pending inserts. Dropping the
/// session without `commit` rolls the transaction back.
pub struct Session {
    state: Mutex<SessionState>,
}

impl Session {
    pub async fn begin(pool: &SqlitePool) -> QuarryResult<Self> {
        Self::begin_with(pool, SessionOptions::default()).await
    }

    pub async fn begin_with(pool: &SqlitePool, options: SessionOptions) -> QuarryResult<Self> {
        let tx = pool.begin().await?;
        tracing::debug!(flush_mode = ?options.flush_mode, "quarry session opened");
        Ok(Self {
            state: Mutex::new(SessionState {
                tx: Some(tx),
                identity_map: IdentityMap::default(),
                pending: VecDeque::new(),
                sequences: HashMap::new(),
                flush_mode: options.flush_mode,
                statements: 0,
            }),
        })
    }

    /// Query factory bound to this session.
    pub fn query(&self) -> QueryFactory<'_> {
        QueryFactory::new(self)
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    /// Assigns an identity, queues the insert and makes `entity` managed.
    #[tracing::instrument(skip_all, fields(entity = E::meta().name))]
    pub async fn persist<E: Entity>(&self, entity: &mut E) -> QuarryResult<()> {
        let meta = E::meta();
        let mut state = self.lock().await;
        if let Some(id) = entity.id() {
            if state.identity_map.contains::<E>(id) {
                return Ok(());
            }
            return Err(QuarryError::DetachedEntity {
                entity: meta.name,
                id,
            });
        }
        let id = state.next_id(meta).await?;
        entity.set_id(id);
        state.pending.push_back(PendingInsert {
            meta,
            values: entity.to_values(),
        });
        state.identity_map.insert(id, entity.clone());
        tracing::debug!(id, "quarry persist");
        Ok(())
    }

    /// Writes every queued insert in persist order.
    pub async fn flush(&self) -> QuarryResult<()> {
        self.lock().await.flush().await
    }

    /// Detaches every managed entity and drops unflushed inserts.
    pub async fn clear(&self) {
        let mut state = self.lock().await;
        if !state.pending.is_empty() {
            tracing::warn!(
                discarded = state.pending.len(),
                "quarry session cleared with unflushed inserts"
            );
        }
        state.pending.clear();
        state.identity_map.clear();
    }

    /// Looks `id` up in the identity map, then in the database.
    #[tracing::instrument(skip(self), fields(entity = E::meta().name))]
    pub async fn find<E: Entity>(&self, id: i64) -> QuarryResult<Option<E>> {
        let mut state = self.lock().await;
        if let Some(entity) = state.identity_map.get::<E>(id) {
            return Ok(Some(entity.clone()));
        }
        state.auto_flush().await?;

        let meta = E::meta();
        let alias = meta.table;
        let mut spec = crate::sql::SelectSpec::default();
        spec.from.push(crate::sql::FromItem {
            table: meta.table,
            alias: alias.to_owned(),
        });
        spec.select = entity_columns(alias, meta);
        spec.filters.push(crate::expr::Node::binary(
            crate::expr::BinaryOp::Eq,
            crate::expr::Node::Column {
                alias: alias.to_owned(),
                column: meta.id_column,
                property: meta.id_property(),
            },
            crate::expr::Node::Literal(Value::Int(id)),
        ));
        let (sql, binds) = spec.render::<Sqlite>();
        let rows = executor::fetch_values(state.conn()?, "find", meta.table, &sql, binds).await?;
        state.count_statement();
        match rows.into_iter().next() {
            Some(values) => load_entity::<E>(values, &mut state.identity_map),
            None => Ok(None),
        }
    }

    /// Runs hand-written SQL whose columns are the entity's columns in mapping order.
    #[tracing::instrument(skip(self, binds), fields(entity = E::meta().name))]
    pub async fn native_query<E: Entity>(&self, sql: &str, binds: Vec<Value>) -> QuarryResult<Vec<E>> {
        let mut state = self.lock().await;
        state.auto_flush().await?;
        let rows = executor::fetch_values(state.conn()?, "native", E::meta().table, sql, binds).await?;
        state.count_statement();
        let mut entities = Vec::with_capacity(rows.len());
        for values in rows {
            if let Some(entity) = load_entity::<E>(values, &mut state.identity_map)? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    pub async fn contains<E: Entity>(&self, entity: &E) -> bool {
        match entity.id() {
            Some(id) => self.lock().await.identity_map.contains::<E>(id),
            None => false,
        }
    }

    /// Inserts queued but not yet written.
    pub async fn pending_count(&self) -> usize {
        self.lock().await.pending.len()
    }

    pub async fn managed_count(&self) -> usize {
        self.lock().await.identity_map.len()
    }

    /// Statements executed so far; each one is a database round-trip.
    pub async fn statement_count(&self) -> u64 {
        self.lock().await.statements
    }

    pub async fn flush_mode(&self) -> FlushMode {
        self.lock().await.flush_mode
    }

    /// Flushes pending inserts and commits the transaction.
    pub async fn commit(self) -> QuarryResult<()> {
        let mut state = self.state.into_inner();
        state.flush().await?;
        let tx = state.tx.take().ok_or(QuarryError::SessionClosed)?;
        tx.commit().await?;
        tracing::debug!("quarry session committed");
        Ok(())
    }

    pub async fn rollback(self) -> QuarryResult<()> {
        let mut state = self.state.into_inner();
        let tx = state.tx.take().ok_or(QuarryError::SessionClosed)?;
        tx.rollback().await?;
        tracing::debug!("quarry session rolled back");
        Ok(())
    }

    /// Runs a rendered SELECT after the automatic flush and decodes the rows
    /// while the identity map is locked.
    pub(crate) async fn select<R, F>(
        &self,
        operation: &'static str,
        table: &str,
        sql: &str,
        binds: Vec<Value>,
        decode: F,
    ) -> QuarryResult<R>
    where
        F: FnOnce(Vec<Vec<Value>>, &mut IdentityMap) -> QuarryResult<R>,
    {
        let mut state = self.lock().await;
        state.auto_flush().await?;
        let rows = executor::fetch_values(state.conn()?, operation, table, sql, binds).await?;
        state.count_statement();
        decode(rows, &mut state.identity_map)
    }
}
