use quarry_core::Entity;

/// Smallest possible entity; used to check that mapping and querying work at all.
#[derive(Debug, Clone, Default, PartialEq, Entity)]
pub struct Hello {
    #[quarry(id)]
    id: Option<i64>,
}
