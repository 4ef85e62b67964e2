use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::entity::{AnyEntity, Entity, EntityMeta, ErasedLoader, IdentityMap, erased_load, load_entity};
use crate::error::{QuarryError, QuarryResult};
use crate::expr::{Expr, Node};
use crate::path::EntityPath;
use crate::subquery::SubQuery;
use crate::value::{FromValue, Value};

/// What a query selects and how each row turns into `Output`.
pub trait Projection: Send + Sync {
    type Output: Send;

    fn select_items(&self) -> Vec<Node>;
    fn decode(&self, values: Vec<Value>, identity_map: &mut IdentityMap) -> QuarryResult<Self::Output>;
}

/// Anything `QueryFactory::select` accepts.
pub trait IntoProjection {
    type Projection: Projection;
    fn into_projection(self) -> Self::Projection;
}

pub(crate) fn entity_columns(alias: &str, meta: &EntityMeta) -> Vec<Node> {
    meta.columns
        .iter()
        .map(|column| Node::Column {
            alias: alias.to_owned(),
            column: column.name,
            property: column.property,
        })
        .collect()
}

/// A single scalar column or expression.
pub struct ExprProjection<T> {
    node: Node,
    _type: PhantomData<fn() -> T>,
}

impl<T: FromValue + Send + 'static> Projection for ExprProjection<T> {
    type Output = T;

    fn select_items(&self) -> Vec<Node> {
        vec![self.node.clone()]
    }

    fn decode(&self, values: Vec<Value>, _identity_map: &mut IdentityMap) -> QuarryResult<T> {
        let value = values.into_iter().next().ok_or(QuarryError::ArityMismatch {
            target: "scalar projection",
            expected: 1,
            found: 0,
        })?;
        T::from_value(value)
    }
}

impl<T: FromValue + Send + 'static> IntoProjection for Expr<T> {
    type Projection = ExprProjection<T>;
    fn into_projection(self) -> Self::Projection {
        ExprProjection {
            node: self.into_node(),
            _type: PhantomData,
        }
    }
}

impl<T: FromValue + Send + 'static> IntoProjection for &Expr<T> {
    type Projection = ExprProjection<T>;
    fn into_projection(self) -> Self::Projection {
        self.clone().into_projection()
    }
}

/// Whole entities of one path, resolved through the session's identity map.
pub struct EntityProjection<P> {
    path: P,
}

impl<P: EntityPath> EntityProjection<P> {
    pub fn new(path: P) -> Self {
        Self { path }
    }
}

impl<P: EntityPath> Projection for EntityProjection<P> {
    type Output = P::Entity;

    fn select_items(&self) -> Vec<Node> {
        entity_columns(self.path.alias(), P::Entity::meta())
    }

    fn decode(&self, values: Vec<Value>, identity_map: &mut IdentityMap) -> QuarryResult<P::Entity> {
        load_entity::<P::Entity>(values, identity_map)?.ok_or_else(|| {
            QuarryError::InvalidQuery(format!(
                "selected {} row has no identity",
                P::Entity::meta().name
            ))
        })
    }
}

enum ItemKind {
    Scalar,
    Entity { width: usize, load: ErasedLoader },
}

/// One entry of a tuple or DTO projection.
pub struct TupleItem {
    key: Node,
    columns: Vec<Node>,
    kind: ItemKind,
}

impl TupleItem {
    pub fn scalar(node: Node) -> Self {
        Self {
            columns: vec![node.clone()],
            key: node,
            kind: ItemKind::Scalar,
        }
    }

    pub fn entity<P: EntityPath>(path: &P) -> Self {
        let columns = entity_columns(path.alias(), P::Entity::meta());
        Self {
            key: path.entity_node(),
            kind: ItemKind::Entity {
                width: columns.len(),
                load: erased_load::<P::Entity>,
            },
            columns,
        }
    }

    fn name(&self) -> Option<&str> {
        self.key.projection_name()
    }
}

/// Something that can appear in `select_tuple((...))` or a DTO projection.
///
/// `#[derive(Entity)]` implements it for the generated path types.
pub trait SelectItem {
    fn into_item(self) -> TupleItem;
}

impl<T> SelectItem for Expr<T> {
    fn into_item(self) -> TupleItem {
        TupleItem::scalar(self.into_node())
    }
}

impl<T> SelectItem for &Expr<T> {
    fn into_item(self) -> TupleItem {
        TupleItem::scalar(self.node().clone())
    }
}

impl<T> SelectItem for SubQuery<T> {
    fn into_item(self) -> TupleItem {
        TupleItem::scalar(self.node())
    }
}

impl<T> SelectItem for &SubQuery<T> {
    fn into_item(self) -> TupleItem {
        TupleItem::scalar(self.node())
    }
}

pub trait IntoTuple {
    fn into_items(self) -> Vec<TupleItem>;
}

macro_rules! impl_into_tuple {
    ($($name:ident),+) => {
        impl<$($name: SelectItem),+> IntoTuple for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_items(self) -> Vec<TupleItem> {
                let ($($name,)+) = self;
                vec![$($name.into_item()),+]
            }
        }
    };
}

impl_into_tuple!(A);
impl_into_tuple!(A, B);
impl_into_tuple!(A, B, C);
impl_into_tuple!(A, B, C, D);
impl_into_tuple!(A, B, C, D, E);
impl_into_tuple!(A, B, C, D, E, F);
impl_into_tuple!(A, B, C, D, E, F, G);
impl_into_tuple!(A, B, C, D, E, F, G, H);

impl IntoTuple for Vec<TupleItem> {
    fn into_items(self) -> Vec<TupleItem> {
        self
    }
}

fn select_nodes(items: &[TupleItem]) -> Vec<Node> {
    items.iter().flat_map(|item| item.columns.iter().cloned()).collect()
}

#[derive(Clone)]
enum TupleValue {
    Scalar(Value),
    Entity(Option<Arc<dyn AnyEntity>>),
}

/// A heterogeneous result row, addressed by the expressions that produced it.
#[derive(Clone)]
pub struct Tuple {
    entries: Vec<(Node, TupleValue)>,
}

/// Keys accepted by [`Tuple::get`].
pub trait TupleKey {
    type Output;
    fn key_node(&self) -> Node;
}

impl<T: FromValue> TupleKey for Expr<T> {
    type Output = T;
    fn key_node(&self) -> Node {
        self.node().clone()
    }
}

impl<T: FromValue> TupleKey for SubQuery<T> {
    type Output = T;
    fn key_node(&self) -> Node {
        self.node()
    }
}

impl Tuple {
    /// The value selected by `key`, or `None` when `key` was not selected
    /// or its value does not decode as `K::Output`.
    pub fn get<K>(&self, key: &K) -> Option<K::Output>
    where
        K: TupleKey,
        K::Output: FromValue,
    {
        let node = key.key_node();
        self.entries.iter().find_map(|(entry, value)| match value {
            TupleValue::Scalar(value) if *entry == node => K::Output::from_value(value.clone()).ok(),
            _ => None,
        })
    }

    /// The entity selected through `path`; `None` for the unmatched side of an outer join.
    pub fn entity<P: EntityPath>(&self, path: &P) -> Option<P::Entity> {
        let node = path.entity_node();
        self.entries.iter().find_map(|(entry, value)| match value {
            TupleValue::Entity(Some(entity)) if *entry == node => {
                entity.as_any().downcast_ref::<P::Entity>().cloned()
            }
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw value at `index`; entities have none.
    pub fn value(&self, index: usize) -> Option<&Value> {
        match self.entries.get(index) {
            Some((_, TupleValue::Scalar(value))) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (_, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match value {
                TupleValue::Scalar(value) => write!(f, "{}", value)?,
                TupleValue::Entity(Some(entity)) => write!(f, "{:?}", entity)?,
                TupleValue::Entity(None) => f.write_str("null")?,
            }
        }
        f.write_str("]")
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tuple{}", self)
    }
}

pub struct TupleProjection {
    items: Vec<TupleItem>,
}

impl Projection for TupleProjection {
    type Output = Tuple;

    fn select_items(&self) -> Vec<Node> {
        select_nodes(&self.items)
    }

    fn decode(&self, values: Vec<Value>, identity_map: &mut IdentityMap) -> QuarryResult<Tuple> {
        let mut values = values.into_iter();
        let mut entries = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let value = match &item.kind {
                ItemKind::Scalar => TupleValue::Scalar(values.next().unwrap_or(Value::Null)),
                ItemKind::Entity { width, load } => {
                    TupleValue::Entity(load(values.by_ref().take(*width).collect(), identity_map)?)
                }
            };
            entries.push((item.key.clone(), value));
        }
        Ok(Tuple { entries })
    }
}

impl IntoProjection for TupleProjection {
    type Projection = Self;
    fn into_projection(self) -> Self {
        self
    }
}

/// DTO populated through generated `set_*` setters.
pub trait BeanTarget: Default {
    fn set_property(&mut self, name: &str, value: Value) -> QuarryResult<()>;
}

/// DTO populated by assigning fields directly.
pub trait FieldTarget: Default {
    fn set_field(&mut self, name: &str, value: Value) -> QuarryResult<()>;
}

/// DTO built by a constructor taking every field in declaration order.
pub trait ConstructorTarget: Sized {
    fn construct(args: Vec<Value>) -> QuarryResult<Self>;
}

fn scalar_values<D>(
    items: &[TupleItem],
    values: Vec<Value>,
) -> QuarryResult<Vec<(Option<&str>, Value)>> {
    if items
        .iter()
        .any(|item| matches!(item.kind, ItemKind::Entity { .. }))
    {
        return Err(QuarryError::InvalidQuery(format!(
            "entities cannot be projected into {}",
            std::any::type_name::<D>()
        )));
    }
    Ok(items.iter().map(TupleItem::name).zip(values).collect())
}

fn require_name<'a, D>(name: Option<&'a str>) -> QuarryResult<&'a str> {
    name.ok_or_else(|| {
        QuarryError::InvalidQuery(format!(
            "unnamed expression projected into {}; name it with as_()",
            std::any::type_name::<D>()
        ))
    })
}

pub struct BeanProjection<D> {
    items: Vec<TupleItem>,
    _target: PhantomData<fn() -> D>,
}

impl<D: BeanTarget + Send + 'static> Projection for BeanProjection<D> {
    type Output = D;

    fn select_items(&self) -> Vec<Node> {
        select_nodes(&self.items)
    }

    fn decode(&self, values: Vec<Value>, _identity_map: &mut IdentityMap) -> QuarryResult<D> {
        let mut target = D::default();
        for (name, value) in scalar_values::<D>(&self.items, values)? {
            target.set_property(require_name::<D>(name)?, value)?;
        }
        Ok(target)
    }
}

pub struct FieldProjection<D> {
    items: Vec<TupleItem>,
    _target: PhantomData<fn() -> D>,
}

impl<D: FieldTarget + Send + 'static> Projection for FieldProjection<D> {
    type Output = D;

    fn select_items(&self) -> Vec<Node> {
        select_nodes(&self.items)
    }

    fn decode(&self, values: Vec<Value>, _identity_map: &mut IdentityMap) -> QuarryResult<D> {
        let mut target = D::default();
        for (name, value) in scalar_values::<D>(&self.items, values)? {
            target.set_field(require_name::<D>(name)?, value)?;
        }
        Ok(target)
    }
}

pub struct ConstructorProjection<D> {
    items: Vec<TupleItem>,
    _target: PhantomData<fn() -> D>,
}

impl<D: ConstructorTarget + Send + 'static> Projection for ConstructorProjection<D> {
    type Output = D;

    fn select_items(&self) -> Vec<Node> {
        select_nodes(&self.items)
    }

    fn decode(&self, values: Vec<Value>, _identity_map: &mut IdentityMap) -> QuarryResult<D> {
        let args = scalar_values::<D>(&self.items, values)?
            .into_iter()
            .map(|(_, value)| value)
            .collect();
        D::construct(args)
    }
}

macro_rules! impl_identity_projection {
    ($($ty:ident: $bound:ident),*) => {
        $(impl<D: $bound + Send + 'static> IntoProjection for $ty<D> {
            type Projection = Self;
            fn into_projection(self) -> Self {
                self
            }
        })*
    };
}

impl_identity_projection!(
    BeanProjection: BeanTarget,
    FieldProjection: FieldTarget,
    ConstructorProjection: ConstructorTarget
);

/// Factory for tuple and DTO projections.
pub struct Projections;

impl Projections {
    pub fn tuple(items: impl IntoTuple) -> TupleProjection {
        TupleProjection {
            items: items.into_items(),
        }
    }

    /// Matches each item's property name or alias to a `set_*` setter.
    pub fn bean<D: BeanTarget>(items: impl IntoTuple) -> BeanProjection<D> {
        BeanProjection {
            items: items.into_items(),
            _target: PhantomData,
        }
    }

    /// Matches each item's property name or alias to a field.
    pub fn fields<D: FieldTarget>(items: impl IntoTuple) -> FieldProjection<D> {
        FieldProjection {
            items: items.into_items(),
            _target: PhantomData,
        }
    }

    /// Passes the items positionally to the DTO's constructor.
    pub fn constructor<D: ConstructorTarget>(items: impl IntoTuple) -> ConstructorProjection<D> {
        ConstructorProjection {
            items: items.into_items(),
            _target: PhantomData,
        }
    }
}
