//! Insert, update and delete builders.

use std::any::Any;
use std::sync::Arc;

use crate::metadata::{Entity, EntityMetadata, MetadataRegistry};

use super::builder::Query;
use super::expr::{field, ScalarExpr};
use super::node::{InsertSource, QueryNode};

/// A compiled-on-demand insert, update or delete.
#[derive(Debug, Clone)]
pub struct Mutation {
    node: Arc<QueryNode>,
    registry: Arc<MetadataRegistry>,
}

impl Mutation {
    pub(crate) fn from_node(node: QueryNode, registry: Arc<MetadataRegistry>) -> Self {
        Self {
            node: Arc::new(node),
            registry,
        }
    }

    /// Insert one entity. Identity and computed columns are left to the
    /// database.
    pub fn insert<T: Entity>(entity: &T) -> Self {
        Self::insert_in(&MetadataRegistry::shared(), entity)
    }

    pub fn insert_in<T: Entity>(registry: &Arc<MetadataRegistry>, entity: &T) -> Self {
        let meta = registry.describe::<T>();
        let values = meta
            .columns
            .iter()
            .filter(|c| c.is_writable())
            .map(|c| (c.field.clone(), c.read(entity)))
            .collect();
        Self::from_node(
            QueryNode::Insert {
                target: meta,
                values: InsertSource::Values(values),
            },
            Arc::clone(registry),
        )
    }

    /// Write every writable non-key column of `entity`, matched by key.
    pub fn update<T: Entity>(entity: &T) -> Self {
        Self::update_in(&MetadataRegistry::shared(), entity)
    }

    pub fn update_in<T: Entity>(registry: &Arc<MetadataRegistry>, entity: &T) -> Self {
        let meta = registry.describe::<T>();
        let set = meta
            .columns
            .iter()
            .filter(|c| c.is_writable() && !c.is_key)
            .map(|c| (c.field.clone(), ScalarExpr::Constant(c.read(entity))))
            .collect();
        Self::from_node(
            QueryNode::Update {
                source: by_key(&meta, entity),
                set,
            },
            Arc::clone(registry),
        )
    }

    /// Delete the row matching `entity`'s key.
    pub fn delete<T: Entity>(entity: &T) -> Self {
        Self::delete_in(&MetadataRegistry::shared(), entity)
    }

    pub fn delete_in<T: Entity>(registry: &Arc<MetadataRegistry>, entity: &T) -> Self {
        let meta = registry.describe::<T>();
        Self::from_node(
            QueryNode::Delete {
                source: by_key(&meta, entity),
            },
            Arc::clone(registry),
        )
    }

    /// `INSERT INTO <Target> SELECT ..`: the query's projected member names
    /// select the target columns.
    pub fn insert_from<Target: Entity, S: 'static>(query: &Query<S>) -> Self {
        let target = query.registry().describe::<Target>();
        Self::from_node(
            QueryNode::Insert {
                target,
                values: InsertSource::Query(Arc::clone(query.node())),
            },
            Arc::clone(query.registry()),
        )
    }

    pub fn node(&self) -> &Arc<QueryNode> {
        &self.node
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    /// The entity whose table is written.
    pub fn target(&self) -> Option<&Arc<EntityMetadata>> {
        self.node.root_entity()
    }
}

/// The entity's table filtered to its key values. Keyless types get the bare
/// table; the compiler rejects those.
fn by_key(meta: &Arc<EntityMetadata>, entity: &dyn Any) -> Arc<QueryNode> {
    let source = Arc::new(QueryNode::Source {
        entity: Arc::clone(meta),
    });
    let predicate = meta
        .key_columns()
        .map(|c| field(&c.field).eq(ScalarExpr::Constant(c.read(entity))))
        .reduce(|acc, next| acc.and(next));
    match predicate {
        Some(predicate) => Arc::new(QueryNode::Filter { source, predicate }),
        None => source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{registry, Order};

    #[test]
    fn test_insert_skips_identity() {
        let order = Order {
            id: 99,
            customer_id: 7,
            ..Default::default()
        };
        let m = Mutation::insert_in(&registry(), &order);
        let QueryNode::Insert {
            values: InsertSource::Values(values),
            ..
        } = &**m.node()
        else {
            panic!("expected insert");
        };
        assert!(values.iter().all(|(f, _)| f != "Id"));
        assert!(values.contains(&("CustomerId".to_string(), 7.into())));
    }

    #[test]
    fn test_update_filters_by_key() {
        let order = Order {
            id: 3,
            ..Default::default()
        };
        let m = Mutation::update_in(&registry(), &order);
        let QueryNode::Update { source, set } = &**m.node() else {
            panic!("expected update");
        };
        assert!(matches!(**source, QueryNode::Filter { .. }));
        assert!(set.iter().all(|(f, _)| f != "Id"));
        assert_eq!(m.target().unwrap().table, "Orders");
    }
}
