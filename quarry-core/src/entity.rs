use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::{QuarryError, QuarryResult};
use crate::path::EntityPath;
use crate::session::Session;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    BigInt,
    Real,
    Text,
    Boolean,
}

/// Mapping of one struct field to one column.
#[derive(Debug)]
pub struct ColumnMeta {
    pub name: &'static str,
    pub property: &'static str,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub primary_key: bool,
    /// Target of a foreign key column.
    pub references: Option<fn() -> &'static EntityMeta>,
}

/// Static mapping metadata, generated by `#[derive(Entity)]`.
#[derive(Debug)]
pub struct EntityMeta {
    pub name: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    pub columns: &'static [ColumnMeta],
}

impl EntityMeta {
    pub fn id_index(&self) -> usize {
        self.columns
            .iter()
            .position(|column| column.primary_key)
            .unwrap_or(0)
    }

    pub fn id_property(&self) -> &'static str {
        self.columns
            .get(self.id_index())
            .map_or("id", |column| column.property)
    }
}

/// A persistent type with a surrogate `i64` identity.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    type Path: EntityPath<Entity = Self>;

    fn meta() -> &'static EntityMeta;
    fn id(&self) -> Option<i64>;
    fn set_id(&mut self, id: i64);
    /// Column values in `meta().columns` order.
    fn to_values(&self) -> Vec<Value>;
    fn from_values(values: Vec<Value>) -> QuarryResult<Self>;
    /// Resolves lazy references against entities already loaded in the session.
    fn attach(&self, _identity_map: &IdentityMap) {}
}

/// Reference to another entity by identity, loaded on demand.
///
/// Clones share the loaded state, so loading through one handle is visible
/// from every copy that came out of the same session.
pub struct LazyRef<E> {
    id: i64,
    cell: Arc<OnceLock<E>>,
}

impl<E> Clone for LazyRef<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<E> fmt::Debug for LazyRef<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyRef")
            .field("id", &self.id)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl<E> PartialEq for LazyRef<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<E> LazyRef<E> {
    /// An unloaded reference.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            cell: Arc::new(OnceLock::new()),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn get(&self) -> Option<&E> {
        self.cell.get()
    }
}

impl<E: Entity> LazyRef<E> {
    /// A loaded reference to `entity`, which must already have an identity.
    pub fn to(entity: &E) -> QuarryResult<Self> {
        let id = entity.id().ok_or(QuarryError::TransientEntity {
            entity: E::meta().name,
        })?;
        let cell = OnceLock::new();
        let _ = cell.set(entity.clone());
        Ok(Self {
            id,
            cell: Arc::new(cell),
        })
    }

    pub fn attach(&self, identity_map: &IdentityMap) {
        if self.is_loaded() {
            return;
        }
        if let Some(entity) = identity_map.get::<E>(self.id) {
            let _ = self.cell.set(entity.clone());
        }
    }

    /// Returns the target, reading it through `session` the first time.
    pub async fn load(&self, session: &Session) -> QuarryResult<&E> {
        if let Some(entity) = self.cell.get() {
            return Ok(entity);
        }
        let entity = session
            .find::<E>(self.id)
            .await?
            .ok_or(QuarryError::EntityNotFound {
                entity: E::meta().name,
                id: self.id,
            })?;
        Ok(self.cell.get_or_init(|| entity))
    }
}

/// Per-session cache of managed entities keyed by `(table, id)`.
#[derive(Default)]
pub struct IdentityMap {
    entries: HashMap<(&'static str, i64), Box<dyn Any + Send + Sync>>,
}

impl fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl IdentityMap {
    pub fn get<E: Entity>(&self, id: i64) -> Option<&E> {
        self.entries
            .get(&(E::meta().table, id))
            .and_then(|entry| entry.downcast_ref::<E>())
    }

    pub fn contains<E: Entity>(&self, id: i64) -> bool {
        self.entries.contains_key(&(E::meta().table, id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn insert<E: Entity>(&mut self, id: i64, entity: E) {
        self.entries.insert((E::meta().table, id), Box::new(entity));
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Type-erased entity stored in tuples.
pub trait AnyEntity: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

impl<E: Entity> AnyEntity for E {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) type ErasedLoader =
    fn(Vec<Value>, &mut IdentityMap) -> QuarryResult<Option<Arc<dyn AnyEntity>>>;

/// Decodes one entity from its columns, returning the managed instance.
///
/// An all-null identity (the unmatched side of an outer join) yields `None`.
pub(crate) fn load_entity<E: Entity>(
    values: Vec<Value>,
    identity_map: &mut IdentityMap,
) -> QuarryResult<Option<E>> {
    if values
        .get(E::meta().id_index())
        .is_none_or(Value::is_null)
    {
        return Ok(None);
    }
    let decoded = E::from_values(values)?;
    let Some(id) = decoded.id() else {
        return Ok(None);
    };
    let managed = match identity_map.get::<E>(id) {
        Some(existing) => existing.clone(),
        None => {
            identity_map.insert(id, decoded.clone());
            decoded
        }
    };
    managed.attach(identity_map);
    Ok(Some(managed))
}

pub(crate) fn erased_load<E: Entity>(
    values: Vec<Value>,
    identity_map: &mut IdentityMap,
) -> QuarryResult<Option<Arc<dyn AnyEntity>>> {
    Ok(load_entity::<E>(values, identity_map)?.map(|entity| Arc::new(entity) as Arc<dyn AnyEntity>))
}
