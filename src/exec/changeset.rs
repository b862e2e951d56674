//! Heterogeneous writes submitted as one batch.

use std::any::Any;
use std::sync::Arc;

use crate::ast::Mutation;
use crate::command::Command;
use crate::compile::{CompileOptions, ToCommand};
use crate::error::{QuarryError, QuarryResult};
use crate::materialize::MultiReader;
use crate::metadata::{Entity, EntityMetadata, MetadataRegistry};
use crate::value::Value;

/// An inserted entity waiting for its generated key.
struct IdentityTarget<'a> {
    entity: &'a mut (dyn Any + Send),
    meta: Arc<EntityMetadata>,
}

struct Entry<'a> {
    mutation: Mutation,
    target: Option<IdentityTarget<'a>>,
}

/// Inserts, updates and deletes run together, in order, under one
/// transaction. Inserted entities borrowed here receive their generated
/// identity once the batch has run.
///
/// ```ignore
/// let mut changes = ChangeSet::new();
/// changes.insert(&mut order).update(&customer).delete(&stale);
/// session.submit(changes)?;
/// assert!(order.id > 0);
/// ```
pub struct ChangeSet<'a> {
    registry: Arc<MetadataRegistry>,
    entries: Vec<Entry<'a>>,
}

impl Default for ChangeSet<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ChangeSet<'a> {
    pub fn new() -> Self {
        Self::with_registry(&MetadataRegistry::shared())
    }

    pub fn with_registry(registry: &Arc<MetadataRegistry>) -> Self {
        Self {
            registry: Arc::clone(registry),
            entries: Vec::new(),
        }
    }

    pub fn insert<T: Entity>(&mut self, entity: &'a mut T) -> &mut Self {
        let mutation = Mutation::insert_in(&self.registry, &*entity);
        let meta = self.registry.describe::<T>();
        let target = meta
            .identity_column()
            .is_some()
            .then(|| IdentityTarget {
                entity: entity as &mut (dyn Any + Send),
                meta: Arc::clone(&meta),
            });
        self.entries.push(Entry { mutation, target });
        self
    }

    pub fn update<T: Entity>(&mut self, entity: &T) -> &mut Self {
        self.push(Mutation::update_in(&self.registry, entity))
    }

    pub fn delete<T: Entity>(&mut self, entity: &T) -> &mut Self {
        self.push(Mutation::delete_in(&self.registry, entity))
    }

    /// Add a mutation built elsewhere, e.g. `query.update_set(..)`.
    pub fn push(&mut self, mutation: Mutation) -> &mut Self {
        self.entries.push(Entry {
            mutation,
            target: None,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn compile(&self, options: CompileOptions) -> QuarryResult<Vec<Command>> {
        self.entries
            .iter()
            .map(|e| e.mutation.to_command(options))
            .collect()
    }

    /// Write generated identities back, in submission order.
    pub(crate) fn assign_identities(self, reader: &mut MultiReader) -> QuarryResult<()> {
        for entry in self.entries {
            let Some(target) = entry.target else {
                continue;
            };
            let value: Value = reader.read_scalar()?;
            let Some(column) = target.meta.identity_column() else {
                continue;
            };
            column
                .write(target.entity, value.clone())
                .map_err(|e| {
                    QuarryError::mapping(
                        format!("{}.{}: {e}", target.meta.type_name, column.field),
                        vec![value],
                    )
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Shape;
    use crate::sql::Dialect;
    use crate::test_fixtures::{registry, AuditEntry, Customer, Line};

    #[test]
    fn test_only_identity_inserts_wait_for_keys() {
        let registry = registry();
        let mut line = Line::default();
        let mut audit = AuditEntry::default();
        let mut changes = ChangeSet::with_registry(&registry);
        changes
            .insert(&mut line)
            .insert(&mut audit)
            .update(&Customer {
                id: 3,
                ..Customer::default()
            });

        assert_eq!(changes.len(), 3);
        let waiting: Vec<_> = changes.entries.iter().map(|e| e.target.is_some()).collect();
        assert_eq!(waiting, [true, false, false]);

        let commands = changes.compile(CompileOptions::new(Dialect::Sqlite)).unwrap();
        assert!(matches!(commands[0].shape(), Shape::Insert { identity: true }));
        assert!(matches!(commands[1].shape(), Shape::Insert { identity: false }));
        assert!(matches!(commands[2].shape(), Shape::Mutation));
    }
}
