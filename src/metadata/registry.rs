//! Process-wide cache of entity metadata.

use std::any::TypeId;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};
use tracing::debug;

use super::entity::{Entity, EntityBuilder};
use super::model::EntityMetadata;

static SHARED: Lazy<Arc<MetadataRegistry>> = Lazy::new(|| Arc::new(MetadataRegistry::new()));

/// Caches one [`EntityMetadata`] per entity type.
///
/// A type is described at most once, even when several threads ask for it
/// at the same time; later lookups are lock-free reads of the cached `Arc`.
#[derive(Default)]
pub struct MetadataRegistry {
    entries: DashMap<TypeId, Arc<OnceCell<Arc<EntityMetadata>>>>,
}

impl MetadataRegistry {
    /// An empty registry, independent of the shared one.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn shared() -> Arc<MetadataRegistry> {
        Arc::clone(&SHARED)
    }

    /// Metadata for `T`, described on first request.
    pub fn describe<T: Entity>(&self) -> Arc<EntityMetadata> {
        // Clone the cell out so the map shard is not locked while `describe`
        // runs; a declaration may describe its navigation targets.
        let cell = self
            .entries
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        cell.get_or_init(|| {
            let metadata = EntityBuilder::<T>::build();
            debug!(
                entity = metadata.type_name,
                table = %metadata.table,
                columns = metadata.columns.len(),
                links = metadata.links.len(),
                "described entity"
            );
            Arc::new(metadata)
        })
        .clone()
    }

    /// Metadata for a type that has already been described.
    pub fn get(&self, type_id: TypeId) -> Option<Arc<EntityMetadata>> {
        self.entries
            .get(&type_id)
            .and_then(|cell| cell.get().cloned())
    }

    /// Number of described types.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every described type.
    pub fn reset(&self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataRegistry")
            .field("types", &self.len())
            .finish()
    }
}
