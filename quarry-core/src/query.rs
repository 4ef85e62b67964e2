use futures_util::StreamExt;
use serde::Serialize;
use sqlx::Sqlite;

use crate::dialect::SqlDialect;
use crate::entity::{Entity, ErasedLoader, IdentityMap, erased_load};
use crate::error::{QuarryError, QuarryResult};
use crate::executor;
use crate::expr::{Expr, Node, OrderSpecifier, Predicate};
use crate::path::{EntityPath, JoinPath};
use crate::projection::{Projection, entity_columns};
use crate::session::Session;
use crate::sql::{JoinKind, SelectSpec};
use crate::value::{FromValue, Value};

/// One page of results plus the unpaged total.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResults<T> {
    pub results: Vec<T>,
    pub total: i64,
    pub limit: Option<i64>,
    pub offset: i64,
}

impl<T> QueryResults<T> {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Columns of an entity joined with `fetch_join`, loaded into the identity map.
#[derive(Clone)]
struct JoinedEntity {
    columns: Vec<Node>,
    load: ErasedLoader,
}

impl JoinedEntity {
    fn of<Q: EntityPath>(target: &Q) -> Self {
        Self {
            columns: entity_columns(target.alias(), <Q::Entity as Entity>::meta()),
            load: erased_load::<Q::Entity>,
        }
    }
}

/// A typed SELECT bound to a session.
///
/// Built through [`QueryFactory`](crate::QueryFactory); nothing runs until a
/// `fetch*` method or `stream` is called.
pub struct Query<'s, P> {
    session: &'s Session,
    projection: P,
    width: usize,
    spec: SelectSpec,
    last_join: Option<JoinedEntity>,
    fetched: Vec<JoinedEntity>,
    invalid: Option<String>,
}

impl<'s, P: Projection> Query<'s, P> {
    pub(crate) fn new(session: &'s Session, projection: P) -> Self {
        Self {
            session,
            width: projection.select_items().len(),
            projection,
            spec: SelectSpec::default(),
            last_join: None,
            fetched: Vec::new(),
            invalid: None,
        }
    }

    fn reject(&mut self, message: &str) {
        if self.invalid.is_none() {
            self.invalid = Some(message.to_owned());
        }
    }

    pub fn from<Q: EntityPath>(mut self, path: &Q) -> Self {
        self.spec.from.push(crate::sql::FromItem::of(path));
        self
    }

    fn push_join<Q: EntityPath>(mut self, kind: JoinKind, target: &Q, on: Option<Node>) -> Self {
        self.spec.push_join(kind, target, on);
        self.last_join = Some(JoinedEntity::of(target));
        self
    }

    /// `INNER JOIN target ON <association>`.
    pub fn join<Q: EntityPath>(self, association: &impl JoinPath<Q>, target: &Q) -> Self {
        let on = association.join_condition(target);
        self.push_join(JoinKind::Inner, target, Some(on))
    }

    /// `LEFT OUTER JOIN target ON <association>`.
    pub fn left_join<Q: EntityPath>(self, association: &impl JoinPath<Q>, target: &Q) -> Self {
        let on = association.join_condition(target);
        self.push_join(JoinKind::Left, target, Some(on))
    }

    /// Joins an unrelated entity; the condition comes from `on`.
    pub fn join_entity<Q: EntityPath>(self, target: &Q) -> Self {
        self.push_join(JoinKind::Inner, target, None)
    }

    pub fn left_join_entity<Q: EntityPath>(self, target: &Q) -> Self {
        self.push_join(JoinKind::Left, target, None)
    }

    /// Extra condition for the most recent join.
    pub fn on(mut self, predicate: Predicate) -> Self {
        if !self.spec.restrict_last_join(predicate.into_node()) {
            self.reject("on() called without a preceding join");
        }
        self
    }

    /// Loads the most recently joined entity together with the result rows.
    pub fn fetch_join(mut self) -> Self {
        match self.last_join.take() {
            Some(joined) => self.fetched.push(joined),
            None => self.reject("fetch_join() called without a preceding join"),
        }
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.spec.filters.push(predicate.into_node());
        self
    }

    /// Every predicate is ANDed; `None` entries are skipped.
    pub fn filter_all<I>(mut self, predicates: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Option<Predicate>>,
    {
        self.spec.filters.extend(
            predicates
                .into_iter()
                .filter_map(Into::into)
                .map(Expr::into_node),
        );
        self
    }

    pub fn group_by<T>(mut self, expr: &Expr<T>) -> Self {
        self.spec.group_by.push(expr.node().unaliased().clone());
        self
    }

    pub fn having(mut self, predicate: Predicate) -> Self {
        self.spec.having.push(predicate.into_node());
        self
    }

    pub fn order_by(mut self, order: OrderSpecifier) -> Self {
        self.spec.order_by.push(order);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.spec.distinct = true;
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.spec.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.spec.limit = Some(limit);
        self
    }

    fn statement(&self) -> QuarryResult<SelectSpec> {
        if let Some(message) = &self.invalid {
            return Err(QuarryError::InvalidQuery(message.clone()));
        }
        if self.spec.from.is_empty() {
            return Err(QuarryError::InvalidQuery(
                "query has no FROM source".to_owned(),
            ));
        }
        let mut spec = self.spec.clone();
        spec.select = self.projection.select_items();
        for joined in &self.fetched {
            spec.select.extend(joined.columns.iter().cloned());
        }
        Ok(spec)
    }

    /// Rendered SQL and binds for `DB`.
    pub fn render<DB: SqlDialect>(&self) -> QuarryResult<(String, Vec<Value>)> {
        Ok(self.statement()?.render::<DB>())
    }

    /// SQLite SQL, as executed.
    pub fn to_sql(&self) -> QuarryResult<String> {
        Ok(self.render::<Sqlite>()?.0)
    }

    fn decode_row(&self, mut values: Vec<Value>, identity_map: &mut IdentityMap) -> QuarryResult<P::Output> {
        let mut rest = values.split_off(self.width.min(values.len()));
        for joined in &self.fetched {
            let tail = rest.split_off(joined.columns.len().min(rest.len()));
            (joined.load)(rest, identity_map)?;
            rest = tail;
        }
        self.projection.decode(values, identity_map)
    }

    async fn run(&self, operation: &'static str, spec: SelectSpec) -> QuarryResult<Vec<P::Output>> {
        let (sql, binds) = spec.render::<Sqlite>();
        self.session
            .select(operation, spec.primary_table(), &sql, binds, |rows, identity_map| {
                rows.into_iter()
                    .map(|values| self.decode_row(values, identity_map))
                    .collect()
            })
            .await
    }

    #[tracing::instrument(skip(self), fields(table = self.spec.primary_table()))]
    pub async fn fetch(&self) -> QuarryResult<Vec<P::Output>> {
        let spec = self.statement()?;
        self.run("select", spec).await
    }

    /// Exactly one row; zero rows is `NoResult`, several are `NonUniqueResult`.
    #[tracing::instrument(skip(self), fields(table = self.spec.primary_table()))]
    pub async fn fetch_one(&self) -> QuarryResult<P::Output> {
        self.fetch_optional().await?.ok_or(QuarryError::NoResult)
    }

    /// Zero or one row; several are `NonUniqueResult`.
    pub async fn fetch_optional(&self) -> QuarryResult<Option<P::Output>> {
        let mut spec = self.statement()?;
        if spec.limit.is_none() {
            spec.limit = Some(2);
        }
        let mut rows = self.run("select", spec).await?;
        if rows.len() > 1 {
            return Err(QuarryError::NonUniqueResult);
        }
        Ok(rows.pop())
    }

    pub async fn fetch_first(&self) -> QuarryResult<Option<P::Output>> {
        let mut spec = self.statement()?;
        spec.limit = Some(1);
        Ok(self.run("select", spec).await?.into_iter().next())
    }

    /// Row count of the query with ordering and paging removed.
    #[tracing::instrument(skip(self), fields(table = self.spec.primary_table()))]
    pub async fn fetch_count(&self) -> QuarryResult<i64> {
        let spec = self.statement()?;
        let (sql, binds) = spec.render_count::<Sqlite>();
        self.session
            .select("count", spec.primary_table(), &sql, binds, |rows, _| {
                rows.into_iter()
                    .next()
                    .and_then(|row| row.into_iter().next())
                    .map_or(Ok(0), i64::from_value)
            })
            .await
    }

    /// The current page together with the total row count.
    ///
    /// The page query is skipped when the count is zero.
    #[tracing::instrument(skip(self), fields(table = self.spec.primary_table()))]
    pub async fn fetch_results(&self) -> QuarryResult<QueryResults<P::Output>> {
        let total = self.fetch_count().await?;
        let results = if total == 0 {
            Vec::new()
        } else {
            self.fetch().await?
        };
        Ok(QueryResults {
            results,
            total,
            limit: self.spec.limit,
            offset: self.spec.offset.unwrap_or(0),
        })
    }

    /// Rows decoded one at a time. The session stays locked until the stream
    /// is dropped.
    #[tracing::instrument(skip(self), fields(table = self.spec.primary_table()))]
    pub fn stream(
        &self,
    ) -> QuarryResult<futures_util::stream::BoxStream<'_, QuarryResult<P::Output>>> {
        let spec = self.statement()?;
        let (sql, binds) = spec.render::<Sqlite>();
        Ok(Box::pin(async_stream::try_stream! {
            let mut state = self.session.lock().await;
            state.auto_flush().await?;
            state.count_statement();
            let (conn, identity_map) = state.parts()?;
            let mut rows = executor::stream_values(conn, &sql, binds);
            while let Some(values) = rows.next().await {
                yield self.decode_row(values?, identity_map)?;
            }
        }))
    }
}
