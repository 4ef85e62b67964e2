use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::dialect::SqlDialect;
use crate::entity::EntityMeta;
use crate::schema::insert_sql;

static INSERT_CACHE: OnceLock<Mutex<HashMap<(TypeId, &'static str), Arc<str>>>> = OnceLock::new();

/// Returns the cached INSERT statement for `(DB, table)`.
pub(crate) fn cached_insert_sql<DB>(meta: &'static EntityMeta) -> Arc<str>
where
    DB: SqlDialect + 'static,
{
    let key = (TypeId::of::<DB>(), meta.table);
    let cache = INSERT_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(
        guard
            .entry(key)
            .or_insert_with(|| Arc::from(insert_sql::<DB>(meta))),
    )
}
