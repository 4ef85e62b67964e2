use std::fmt::Write;
use std::marker::PhantomData;

use smallvec::SmallVec;

use crate::dialect::SqlDialect;
use crate::entity::Entity;
use crate::expr::{BinaryOp, Node, NullsOrder, OrderSpecifier};
use crate::path::EntityPath;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// `table AS alias`.
#[derive(Debug, Clone, PartialEq)]
pub struct FromItem {
    pub(crate) table: &'static str,
    pub(crate) alias: String,
}

impl FromItem {
    pub(crate) fn of<P: EntityPath>(path: &P) -> Self {
        Self {
            table: P::Entity::meta().table,
            alias: path.alias().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub(crate) kind: JoinKind,
    pub(crate) source: FromItem,
    pub(crate) on: Option<Node>,
}

/// The dialect-independent shape of one SELECT statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectSpec {
    pub(crate) select: Vec<Node>,
    pub(crate) distinct: bool,
    pub(crate) from: SmallVec<[FromItem; 2]>,
    pub(crate) joins: SmallVec<[JoinSpec; 2]>,
    pub(crate) filters: Vec<Node>,
    pub(crate) group_by: Vec<Node>,
    pub(crate) having: Vec<Node>,
    pub(crate) order_by: Vec<OrderSpecifier>,
    pub(crate) limit: Option<i64>,
    pub(crate) offset: Option<i64>,
}

impl SelectSpec {
    pub(crate) fn from_entity<P: EntityPath>(path: &P) -> Self {
        let mut spec = Self::default();
        spec.from.push(FromItem::of(path));
        spec
    }

    pub(crate) fn push_join<P: EntityPath>(&mut self, kind: JoinKind, target: &P, on: Option<Node>) {
        self.joins.push(JoinSpec {
            kind,
            source: FromItem::of(target),
            on,
        });
    }

    /// Adds `condition` to the ON clause of the most recent join.
    pub(crate) fn restrict_last_join(&mut self, condition: Node) -> bool {
        let Some(join) = self.joins.last_mut() else {
            return false;
        };
        join.on = Some(match join.on.take() {
            Some(existing) => Node::binary(BinaryOp::And, existing, condition),
            None => condition,
        });
        true
    }

    /// Table of the first FROM item, used as the log and metric label.
    pub(crate) fn primary_table(&self) -> &'static str {
        self.from.first().map_or("", |item| item.table)
    }

    pub fn render<DB: SqlDialect>(&self) -> (String, Vec<Value>) {
        let mut writer = SqlWriter::<DB>::new();
        writer.select(self);
        writer.finish()
    }

    /// `SELECT COUNT(*)` over this query without ordering or paging.
    pub fn render_count<DB: SqlDialect>(&self) -> (String, Vec<Value>) {
        let mut inner = self.clone();
        inner.order_by.clear();
        inner.limit = None;
        inner.offset = None;

        let mut writer = SqlWriter::<DB>::new();
        writer.push("SELECT COUNT(*) FROM (");
        writer.select(&inner);
        writer.push(") AS ");
        writer.ident("count_source");
        writer.finish()
    }
}

pub(crate) struct SqlWriter<DB> {
    sql: String,
    binds: Vec<Value>,
    _db: PhantomData<fn() -> DB>,
}

impl<DB: SqlDialect> SqlWriter<DB> {
    pub(crate) fn new() -> Self {
        Self {
            sql: String::with_capacity(128),
            binds: Vec::new(),
            _db: PhantomData,
        }
    }

    pub(crate) fn finish(self) -> (String, Vec<Value>) {
        (self.sql, self.binds)
    }

    pub(crate) fn push(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    pub(crate) fn ident(&mut self, ident: &str) {
        self.sql.push_str(&DB::quote_identifier(ident));
    }

    fn bind(&mut self, value: Value) {
        self.binds.push(value);
        self.sql.push_str(&DB::placeholder(self.binds.len()));
    }

    fn source(&mut self, item: &FromItem) {
        self.ident(item.table);
        self.push(" AS ");
        self.ident(&item.alias);
    }

    fn list(&mut self, nodes: &[Node]) {
        for (i, node) in nodes.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.node(node);
        }
    }

    fn conjunction(&mut self, nodes: &[Node]) {
        for (i, node) in nodes.iter().enumerate() {
            if i > 0 {
                self.push(" AND ");
            }
            self.node(node);
        }
    }

    fn select(&mut self, spec: &SelectSpec) {
        self.push("SELECT ");
        if spec.distinct {
            self.push("DISTINCT ");
        }
        if spec.select.is_empty() {
            self.push("*");
        }
        for (i, item) in spec.select.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            match item {
                Node::Alias { expr, name } => {
                    self.node(expr);
                    self.push(" AS ");
                    self.ident(name);
                }
                other => self.node(other),
            }
        }

        self.push(" FROM ");
        for (i, item) in spec.from.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.source(item);
        }

        for join in &spec.joins {
            self.push(match (join.kind, &join.on) {
                (JoinKind::Inner, None) => " CROSS JOIN ",
                (JoinKind::Inner, Some(_)) => " INNER JOIN ",
                (JoinKind::Left, _) => " LEFT OUTER JOIN ",
            });
            self.source(&join.source);
            match &join.on {
                Some(on) => {
                    self.push(" ON ");
                    self.node(on);
                }
                None if join.kind == JoinKind::Left => self.push(" ON 1 = 1"),
                None => {}
            }
        }

        if !spec.filters.is_empty() {
            self.push(" WHERE ");
            self.conjunction(&spec.filters);
        }
        if !spec.group_by.is_empty() {
            self.push(" GROUP BY ");
            self.list(&spec.group_by);
        }
        if !spec.having.is_empty() {
            self.push(" HAVING ");
            self.conjunction(&spec.having);
        }
        if !spec.order_by.is_empty() {
            self.push(" ORDER BY ");
            for (i, order) in spec.order_by.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.node(order.target.unaliased());
                self.push(if order.descending { " DESC" } else { " ASC" });
                match order.nulls {
                    Some(NullsOrder::First) => self.push(" NULLS FIRST"),
                    Some(NullsOrder::Last) => self.push(" NULLS LAST"),
                    None => {}
                }
            }
        }

        match (spec.limit, spec.offset) {
            (Some(limit), Some(offset)) => {
                let _ = write!(self.sql, " LIMIT {} OFFSET {}", limit, offset);
            }
            (Some(limit), None) => {
                let _ = write!(self.sql, " LIMIT {}", limit);
            }
            (None, Some(offset)) => {
                let _ = write!(
                    self.sql,
                    " LIMIT {} OFFSET {}",
                    DB::unbounded_limit(),
                    offset
                );
            }
            (None, None) => {}
        }
    }

    fn node(&mut self, node: &Node) {
        match node {
            Node::Column { alias, column, .. } => {
                self.ident(alias);
                self.push(".");
                self.ident(column);
            }
            Node::Entity { alias, .. } => {
                self.ident(alias);
                self.push(".*");
            }
            Node::Literal(value) => self.bind(value.clone()),
            Node::Binary { op, lhs, rhs } => {
                let parens = op.needs_parens();
                if parens {
                    self.push("(");
                }
                self.node(lhs);
                self.push(" ");
                self.push(op.as_sql());
                self.push(" ");
                self.node(rhs);
                if parens {
                    self.push(")");
                }
            }
            Node::Not(inner) => {
                self.push("NOT (");
                self.node(inner);
                self.push(")");
            }
            Node::NullCheck { expr, negated } => {
                self.node(expr);
                self.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Node::Between { expr, low, high } => {
                self.node(expr);
                self.push(" BETWEEN ");
                self.node(low);
                self.push(" AND ");
                self.node(high);
            }
            Node::InList { expr, items } => {
                if items.is_empty() {
                    self.push("1 = 0");
                } else {
                    self.node(expr);
                    self.push(" IN (");
                    self.list(items);
                    self.push(")");
                }
            }
            Node::InSubquery { expr, subquery } => {
                self.node(expr);
                self.push(" IN (");
                self.select(subquery);
                self.push(")");
            }
            Node::Exists(subquery) => {
                self.push("EXISTS (");
                self.select(subquery);
                self.push(")");
            }
            Node::Aggregate {
                func,
                arg,
                distinct,
            } => {
                self.push(func.as_sql());
                self.push("(");
                if *distinct {
                    self.push("DISTINCT ");
                }
                self.node(arg);
                self.push(")");
            }
            Node::CountAll => self.push("COUNT(*)"),
            Node::Case {
                operand,
                branches,
                otherwise,
            } => {
                self.push("CASE");
                if let Some(operand) = operand {
                    self.push(" ");
                    self.node(operand);
                }
                for (when, then) in branches {
                    self.push(" WHEN ");
                    self.node(when);
                    self.push(" THEN ");
                    self.node(then);
                }
                self.push(" ELSE ");
                self.node(otherwise);
                self.push(" END");
            }
            Node::CastText(inner) => {
                self.push("CAST(");
                self.node(inner);
                self.push(" AS ");
                self.push(DB::text_type());
                self.push(")");
            }
            Node::Subquery(subquery) => {
                self.push("(");
                self.select(subquery);
                self.push(")");
            }
            Node::Alias { expr, .. } => self.node(expr),
        }
    }
}
