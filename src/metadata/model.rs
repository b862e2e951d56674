//! Described entity types: columns, keys, navigations and accessors.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::sql::TableRef;
use crate::value::{TypeHint, Value, ValueError};

use super::registry::MetadataRegistry;

/// Reads a column value out of a type-erased entity.
pub(crate) type Getter = Arc<dyn Fn(&dyn Any) -> Value + Send + Sync>;

/// Writes a column value into a type-erased entity.
pub(crate) type Setter = Arc<dyn Fn(&mut dyn Any, Value) -> Result<(), ValueError> + Send + Sync>;

/// Attaches a hydrated child entity to its owner.
pub(crate) type Attach =
    Arc<dyn Fn(&mut dyn Any, Box<dyn Any>) -> Result<(), ValueError> + Send + Sync>;

/// A mapped column.
#[derive(Clone)]
pub struct ColumnMeta {
    /// Member name used in query expressions.
    pub field: String,
    /// Column name in the table.
    pub name: String,
    pub is_key: bool,
    pub is_identity: bool,
    /// Computed by the database; never written.
    pub is_computed: bool,
    pub nullable: bool,
    pub type_hint: TypeHint,
    pub size: Option<u32>,
    pub scale: Option<u8>,
    pub(crate) get: Getter,
    pub(crate) set: Setter,
}

impl ColumnMeta {
    /// Read this column from an entity.
    pub fn read(&self, entity: &dyn Any) -> Value {
        (self.get)(entity)
    }

    /// Write a value into this column of an entity.
    pub fn write(&self, entity: &mut dyn Any, value: Value) -> Result<(), ValueError> {
        (self.set)(entity, value)
    }

    /// Whether inserts and updates carry this column.
    pub fn is_writable(&self) -> bool {
        !self.is_identity && !self.is_computed
    }
}

impl fmt::Debug for ColumnMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnMeta")
            .field("field", &self.field)
            .field("name", &self.name)
            .field("is_key", &self.is_key)
            .field("is_identity", &self.is_identity)
            .field("is_computed", &self.is_computed)
            .field("nullable", &self.nullable)
            .field("type_hint", &self.type_hint)
            .field("size", &self.size)
            .field("scale", &self.scale)
            .finish()
    }
}

/// A declared relationship to another entity type.
///
/// `local_keys` name fields on the owner, `foreign_keys` the matching fields
/// on the target, pairwise.
#[derive(Clone)]
pub struct ForeignKeyLink {
    pub member: String,
    pub local_keys: Vec<String>,
    pub foreign_keys: Vec<String>,
    pub target: TypeId,
    pub target_name: &'static str,
    pub is_collection: bool,
    pub(crate) describe_target: fn(&MetadataRegistry) -> Arc<EntityMetadata>,
    pub(crate) attach: Attach,
}

impl ForeignKeyLink {
    /// Metadata of the target type, populated on first use.
    pub fn target_metadata(&self, registry: &MetadataRegistry) -> Arc<EntityMetadata> {
        (self.describe_target)(registry)
    }

    /// Hand a hydrated child to its owner (set for references, push for collections).
    pub(crate) fn attach(&self, owner: &mut dyn Any, child: Box<dyn Any>) -> Result<(), ValueError> {
        (self.attach)(owner, child)
    }
}

impl fmt::Debug for ForeignKeyLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignKeyLink")
            .field("member", &self.member)
            .field("local_keys", &self.local_keys)
            .field("foreign_keys", &self.foreign_keys)
            .field("target", &self.target_name)
            .field("is_collection", &self.is_collection)
            .finish()
    }
}

/// Everything the compiler and materializer know about one entity type.
pub struct EntityMetadata {
    pub type_id: TypeId,
    /// Unqualified Rust type name.
    pub type_name: &'static str,
    pub schema: Option<String>,
    pub table: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnMeta>,
    pub links: Vec<ForeignKeyLink>,
    pub(crate) create: fn() -> Box<dyn Any + Send>,
}

impl EntityMetadata {
    /// Look a column up by member name, falling back to the column name.
    pub fn column(&self, field: &str) -> Option<&ColumnMeta> {
        self.columns
            .iter()
            .find(|c| c.field == field)
            .or_else(|| self.columns.iter().find(|c| c.name == field))
    }

    /// Look a navigation up by member name.
    pub fn link(&self, member: &str) -> Option<&ForeignKeyLink> {
        self.links.iter().find(|l| l.member == member)
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &ColumnMeta> {
        self.columns.iter().filter(|c| c.is_key)
    }

    pub fn has_key(&self) -> bool {
        self.columns.iter().any(|c| c.is_key)
    }

    pub fn identity_column(&self) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.is_identity)
    }

    /// The table this type maps to, unaliased.
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(&self.table).with_schema(self.schema.as_deref())
    }

    /// A fresh default instance of the described type.
    pub(crate) fn create(&self) -> Box<dyn Any + Send> {
        (self.create)()
    }

    /// Key values of an entity, in key declaration order.
    pub fn key_values(&self, entity: &dyn Any) -> Vec<Value> {
        self.key_columns().map(|c| c.read(entity)).collect()
    }
}

impl fmt::Debug for EntityMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMetadata")
            .field("type_name", &self.type_name)
            .field("schema", &self.schema)
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("links", &self.links)
            .finish()
    }
}
