//! Entity metadata.
//!
//! Entity types declare their table, columns, keys and navigations through
//! the [`Entity`] trait. The [`MetadataRegistry`] turns each declaration into
//! an [`EntityMetadata`] once and hands out shared references afterwards.
//!
//! ```text
//! Entity::describe ──▶ EntityBuilder ──▶ EntityMetadata ──▶ MetadataRegistry
//!                                          (columns, keys,     (DashMap<TypeId,
//!                                           links, accessors)   OnceCell<Arc<..>>>)
//! ```

mod entity;
mod model;
mod registry;

pub use entity::{ColumnBuilder, Entity, EntityBuilder};
pub use model::{ColumnMeta, EntityMetadata, ForeignKeyLink};
pub use registry::MetadataRegistry;
