use std::fmt;
use std::marker::PhantomData;

use crate::expr::{Expr, Node, OrderSpecifier, Predicate};
use crate::path::{EntityPath, JoinPath};
use crate::sql::{JoinKind, SelectSpec};

/// A nested SELECT producing values of type `T`.
///
/// Usable as a comparison operand, a select item, the source of `in_subquery`
/// or an `exists()` test. It cannot stand in for a table in FROM.
pub struct SubQuery<T> {
    spec: SelectSpec,
    _type: PhantomData<fn() -> T>,
}

impl<T> Clone for SubQuery<T> {
    fn clone(&self) -> Self {
        Self {
            spec: self.spec.clone(),
            _type: PhantomData,
        }
    }
}

impl<T> fmt::Debug for SubQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SubQuery").field(&self.spec).finish()
    }
}

impl<T> SubQuery<T> {
    pub fn select(expr: &Expr<T>) -> Self {
        Self {
            spec: SelectSpec {
                select: vec![expr.node().clone()],
                ..SelectSpec::default()
            },
            _type: PhantomData,
        }
    }

    pub fn from<P: EntityPath>(mut self, path: &P) -> Self {
        self.spec.from.push(crate::sql::FromItem::of(path));
        self
    }

    pub fn join<Q: EntityPath>(mut self, association: &impl JoinPath<Q>, target: &Q) -> Self {
        let on = association.join_condition(target);
        self.spec.push_join(JoinKind::Inner, target, Some(on));
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.spec.filters.push(predicate.into_node());
        self
    }

    pub fn group_by<U>(mut self, expr: &Expr<U>) -> Self {
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

    pub fn limit(mut self, limit: i64) -> Self {
        self.spec.limit = Some(limit);
        self
    }

    /// The sub-query as a named select item.
    pub fn as_(&self, alias: &str) -> Expr<T> {
        Expr::from_node(Node::Alias {
            expr: Box::new(self.node()),
            name: alias.to_owned(),
        })
    }

    pub fn exists(&self) -> Predicate {
        Expr::from_node(Node::Exists(Box::new(self.spec.clone())))
    }

    pub(crate) fn node(&self) -> Node {
        Node::Subquery(Box::new(self.spec.clone()))
    }

    pub(crate) fn spec(&self) -> &SelectSpec {
        &self.spec
    }

    pub(crate) fn into_spec(self) -> SelectSpec {
        self.spec
    }
}
