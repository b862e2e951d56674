//! Declaring entity types.
//!
//! An entity describes its table, columns and navigations once through an
//! [`EntityBuilder`]. Accessors are plain function pointers, so a declaration
//! never captures state:
//!
//! ```ignore
//! impl Entity for Order {
//!     fn describe(b: &mut EntityBuilder<Self>) {
//!         b.table("Orders");
//!         b.key("Id", |o| o.id, |o, v| o.id = v).identity();
//!         b.column("CustomerId", |o| o.customer_id, |o, v| o.customer_id = v);
//!         b.has_one::<Customer>("Customer", &["CustomerId"], &["Id"], |o, c| o.customer = Some(c));
//!         b.has_many::<Line>("Lines", &["Id"], &["OrderId"], |o, l| o.lines.push(l));
//!     }
//! }
//! ```

use std::any::{type_name, Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

use inflector::Inflector;

use crate::value::{SqlValue, TypeHint, Value, ValueError};

use super::model::{Attach, ColumnMeta, EntityMetadata, ForeignKeyLink, Getter, Setter};
use super::registry::MetadataRegistry;

/// A type mapped to a table.
pub trait Entity: Default + Send + Sync + 'static {
    /// Declare the table, columns and navigations of this type.
    fn describe(builder: &mut EntityBuilder<Self>);
}

/// Collects the declaration of one entity type.
pub struct EntityBuilder<T> {
    schema: Option<String>,
    table: Option<String>,
    columns: Vec<ColumnMeta>,
    links: Vec<ForeignKeyLink>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> EntityBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            schema: None,
            table: None,
            columns: Vec::new(),
            links: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Run `T::describe` and produce its metadata.
    pub(crate) fn build() -> EntityMetadata {
        let mut builder = Self::new();
        T::describe(&mut builder);
        builder.finish()
    }

    pub fn table(&mut self, name: &str) -> &mut Self {
        self.table = Some(name.to_string());
        self
    }

    pub fn schema(&mut self, name: &str) -> &mut Self {
        self.schema = Some(name.to_string());
        self
    }

    /// Declare a key column.
    pub fn key<V: SqlValue>(
        &mut self,
        field: &str,
        get: fn(&T) -> V,
        set: fn(&mut T, V),
    ) -> ColumnBuilder<'_> {
        let builder = self.column(field, get, set);
        builder.column.is_key = true;
        builder
    }

    /// Declare a column. The column name defaults to the field name and the
    /// type hint comes from `V`.
    pub fn column<V: SqlValue>(
        &mut self,
        field: &str,
        get: fn(&T) -> V,
        set: fn(&mut T, V),
    ) -> ColumnBuilder<'_> {
        let getter: Getter = Arc::new(move |entity: &dyn Any| {
            let entity = entity.downcast_ref::<T>();
            debug_assert!(entity.is_some(), "{} column read from another type", type_name::<T>());
            entity.map_or(Value::Null, |e| get(e).into())
        });
        let setter: Setter = Arc::new(move |entity: &mut dyn Any, value| {
            let target = entity
                .downcast_mut::<T>()
                .ok_or(ValueError::Mismatch {
                    expected: type_name::<T>(),
                    found: "entity",
                })?;
            set(target, V::from_value(value)?);
            Ok(())
        });

        self.columns.push(ColumnMeta {
            field: field.to_string(),
            name: field.to_string(),
            is_key: false,
            is_identity: false,
            is_computed: false,
            nullable: V::NULLABLE,
            type_hint: V::HINT,
            size: None,
            scale: None,
            get: getter,
            set: setter,
        });
        let index = self.columns.len() - 1;
        ColumnBuilder {
            column: &mut self.columns[index],
        }
    }

    /// Declare a reference navigation (many-to-one or one-to-one).
    pub fn has_one<U: Entity>(
        &mut self,
        member: &str,
        local_keys: &[&str],
        foreign_keys: &[&str],
        set: fn(&mut T, U),
    ) -> &mut Self {
        self.push_link::<U>(member, local_keys, foreign_keys, false, set)
    }

    /// Declare a collection navigation (one-to-many).
    pub fn has_many<U: Entity>(
        &mut self,
        member: &str,
        local_keys: &[&str],
        foreign_keys: &[&str],
        push: fn(&mut T, U),
    ) -> &mut Self {
        self.push_link::<U>(member, local_keys, foreign_keys, true, push)
    }

    fn push_link<U: Entity>(
        &mut self,
        member: &str,
        local_keys: &[&str],
        foreign_keys: &[&str],
        is_collection: bool,
        apply: fn(&mut T, U),
    ) -> &mut Self {
        let attach: Attach = Arc::new(move |owner: &mut dyn Any, child: Box<dyn Any>| {
            let owner = owner.downcast_mut::<T>().ok_or(ValueError::Mismatch {
                expected: type_name::<T>(),
                found: "navigation owner",
            })?;
            let child = child.downcast::<U>().map_err(|_| ValueError::Mismatch {
                expected: type_name::<U>(),
                found: "navigation child",
            })?;
            apply(owner, *child);
            Ok(())
        });
        self.links.push(ForeignKeyLink {
            member: member.to_string(),
            local_keys: local_keys.iter().map(|k| k.to_string()).collect(),
            foreign_keys: foreign_keys.iter().map(|k| k.to_string()).collect(),
            target: TypeId::of::<U>(),
            target_name: short_type_name::<U>(),
            is_collection,
            describe_target: describe_entity::<U>,
            attach,
        });
        self
    }

    fn finish(self) -> EntityMetadata {
        let type_name = short_type_name::<T>();
        EntityMetadata {
            type_id: TypeId::of::<T>(),
            type_name,
            schema: self.schema,
            table: self.table.unwrap_or_else(|| pluralize(type_name)),
            columns: self.columns,
            links: self.links,
            create: create_entity::<T>,
        }
    }
}

/// Refines a column declaration.
pub struct ColumnBuilder<'a> {
    column: &'a mut ColumnMeta,
}

impl ColumnBuilder<'_> {
    /// Map the field to a differently named column.
    pub fn named(self, column: &str) -> Self {
        self.column.name = column.to_string();
        self
    }

    /// Values are generated by the database on insert.
    pub fn identity(self) -> Self {
        self.column.is_identity = true;
        self
    }

    /// Values are computed by the database and never written.
    pub fn computed(self) -> Self {
        self.column.is_computed = true;
        self
    }

    /// Declared length, bound with text and binary parameters.
    pub fn size(self, size: u32) -> Self {
        self.column.size = Some(size);
        self
    }

    /// Declared scale; for timestamps, the fractional-second precision.
    pub fn scale(self, scale: u8) -> Self {
        self.column.scale = Some(scale);
        self
    }

    pub fn hint(self, hint: TypeHint) -> Self {
        self.column.type_hint = hint;
        self
    }
}

fn describe_entity<U: Entity>(registry: &MetadataRegistry) -> Arc<EntityMetadata> {
    registry.describe::<U>()
}

fn create_entity<U: Entity>() -> Box<dyn Any + Send> {
    Box::new(U::default())
}

fn short_type_name<U>() -> &'static str {
    let full = type_name::<U>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Irregular plurals the inflector gets wrong for table names.
static IRREGULAR_PLURALS: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("index", "indices"),
    ("matrix", "matrices"),
    ("criterion", "criteria"),
    ("datum", "data"),
];

/// Default table name for a type: its plural, keeping the leading capital.
pub(crate) fn pluralize(word: &str) -> String {
    let lower = word.to_lowercase();
    for (singular, plural) in IRREGULAR_PLURALS {
        if lower == *singular {
            let mut chars = plural.chars();
            return match (word.chars().next(), chars.next()) {
                (Some(first), Some(p)) if first.is_uppercase() => {
                    p.to_uppercase().chain(chars).collect()
                }
                _ => plural.to_string(),
            };
        }
    }
    word.to_plural()
}
