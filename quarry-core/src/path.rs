use std::fmt;
use std::marker::PhantomData;

use crate::entity::Entity;
use crate::expr::{AggregateFn, BinaryOp, Expr, Node, Predicate};
use crate::sql::SelectSpec;

/// A query root for one entity under one alias.
///
/// Implemented by the `Q*` types that `#[derive(Entity)]` generates.
pub trait EntityPath: Clone + Send + Sync + 'static {
    type Entity: Entity;

    /// A second instance under a different alias (self joins, sub-queries).
    fn with_alias(alias: &str) -> Self;
    fn alias(&self) -> &str;

    fn id(&self) -> Expr<i64> {
        let meta = Self::Entity::meta();
        Expr::column(self.alias(), meta.id_column, meta.id_property())
    }

    /// `COUNT(alias.id)`.
    fn count(&self) -> Expr<i64> {
        Expr::from_node(Node::Aggregate {
            func: AggregateFn::Count,
            arg: Box::new(self.id().into_node()),
            distinct: false,
        })
    }

    #[doc(hidden)]
    fn entity_node(&self) -> Node {
        Node::Entity {
            alias: self.alias().to_owned(),
            table: Self::Entity::meta().table,
        }
    }
}

/// An association that can drive `join(association, target)`.
pub trait JoinPath<P: EntityPath> {
    /// The ON condition linking the owner alias to `target`.
    fn join_condition(&self, target: &P) -> Node;
}

/// Owning side of a relationship: the foreign key lives on the owner's table.
pub struct ManyToOne<P> {
    owner_alias: String,
    fk_column: &'static str,
    property: &'static str,
    _target: PhantomData<fn() -> P>,
}

impl<P> Clone for ManyToOne<P> {
    fn clone(&self) -> Self {
        Self {
            owner_alias: self.owner_alias.clone(),
            fk_column: self.fk_column,
            property: self.property,
            _target: PhantomData,
        }
    }
}

impl<P> fmt::Debug for ManyToOne<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManyToOne")
            .field("owner", &self.owner_alias)
            .field("fk_column", &self.fk_column)
            .finish()
    }
}

impl<P: EntityPath> ManyToOne<P> {
    pub fn new(owner_alias: &str, fk_column: &'static str, property: &'static str) -> Self {
        Self {
            owner_alias: owner_alias.to_owned(),
            fk_column,
            property,
            _target: PhantomData,
        }
    }

    /// The foreign key column itself; filtering on it needs no join.
    pub fn id(&self) -> Expr<i64> {
        Expr::column(&self.owner_alias, self.fk_column, self.property)
    }

    pub fn is_null(&self) -> Predicate {
        self.id().is_null()
    }

    pub fn is_not_null(&self) -> Predicate {
        self.id().is_not_null()
    }
}

impl<P: EntityPath> JoinPath<P> for ManyToOne<P> {
    fn join_condition(&self, target: &P) -> Node {
        Node::binary(BinaryOp::Eq, self.id().into_node(), target.id().into_node())
    }
}

/// Inverse side of a relationship, derived from the target's foreign key.
pub struct OneToMany<P> {
    owner_alias: String,
    owner_id_column: &'static str,
    fk_column: &'static str,
    property: &'static str,
    _target: PhantomData<fn() -> P>,
}

impl<P> Clone for OneToMany<P> {
    fn clone(&self) -> Self {
        Self {
            owner_alias: self.owner_alias.clone(),
            owner_id_column: self.owner_id_column,
            fk_column: self.fk_column,
            property: self.property,
            _target: PhantomData,
        }
    }
}

impl<P> fmt::Debug for OneToMany<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneToMany")
            .field("owner", &self.owner_alias)
            .field("fk_column", &self.fk_column)
            .finish()
    }
}

impl<P: EntityPath> OneToMany<P> {
    pub fn new(
        owner_alias: &str,
        owner_id_column: &'static str,
        fk_column: &'static str,
        property: &'static str,
    ) -> Self {
        Self {
            owner_alias: owner_alias.to_owned(),
            owner_id_column,
            fk_column,
            property,
            _target: PhantomData,
        }
    }

    fn owner_id(&self) -> Node {
        Node::Column {
            alias: self.owner_alias.clone(),
            column: self.owner_id_column,
            property: "id",
        }
    }

    fn correlated(&self) -> SelectSpec {
        let target = P::with_alias(&format!("{}_{}", self.owner_alias, self.property));
        let mut spec = SelectSpec::from_entity(&target);
        spec.filters.push(self.join_condition(&target));
        spec
    }

    /// Number of rows on the many side, as a correlated sub-query.
    pub fn size(&self) -> Expr<i64> {
        let mut spec = self.correlated();
        spec.select = vec![Node::CountAll];
        Expr::from_node(Node::Subquery(Box::new(spec)))
    }

    pub fn is_empty(&self) -> Predicate {
        self.is_not_empty().not()
    }

    pub fn is_not_empty(&self) -> Predicate {
        let mut spec = self.correlated();
        spec.select = vec![Node::Literal(crate::value::Value::Int(1))];
        Expr::from_node(Node::Exists(Box::new(spec)))
    }
}

impl<P: EntityPath> JoinPath<P> for OneToMany<P> {
    fn join_condition(&self, target: &P) -> Node {
        let fk = Node::Column {
            alias: target.alias().to_owned(),
            column: self.fk_column,
            property: self.property,
        };
        Node::binary(BinaryOp::Eq, fk, self.owner_id())
    }
}
