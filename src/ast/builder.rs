//! Fluent query builder.
//!
//! Every method takes `&self` and returns a new [`Query`] wrapping a new
//! node, so a query can serve as the base of any number of others:
//!
//! ```ignore
//! let orders = Query::<Order>::table();
//! let recent = orders.filter(field("Date").gte(cutoff));
//! let big = orders.filter(field("Total").gt(1000.0));
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{QuarryError, QuarryResult};
use crate::metadata::{Entity, EntityMetadata, MetadataRegistry};
use crate::value::Value;

use super::expr::{AggregateKind, ScalarExpr};
use super::mutation::Mutation;
use super::node::{JoinKind, QueryNode, SortDirection};

/// Rows of a projection, one value per projected member.
pub type Record = Vec<Value>;

/// Marker for the rows of a grouped query; project them with `key()` and
/// aggregates.
pub struct Grouping<T>(PhantomData<fn() -> T>);

/// A query whose rows materialize as `T`.
pub struct Query<T> {
    node: Arc<QueryNode>,
    root: Arc<EntityMetadata>,
    registry: Arc<MetadataRegistry>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            root: Arc::clone(&self.root),
            registry: Arc::clone(&self.registry),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("root", &self.root.type_name)
            .field("node", &self.node)
            .finish()
    }
}

impl<T: Entity> Query<T> {
    /// All rows of `T`'s table, described through the shared registry.
    pub fn table() -> Self {
        Self::table_in(&MetadataRegistry::shared())
    }

    /// All rows of `T`'s table, described through `registry`.
    pub fn table_in(registry: &Arc<MetadataRegistry>) -> Self {
        let entity = registry.describe::<T>();
        Self {
            node: Arc::new(QueryNode::Source {
                entity: Arc::clone(&entity),
            }),
            root: entity,
            registry: Arc::clone(registry),
            _marker: PhantomData,
        }
    }

    /// Load a navigation with each row. `path` is dotted for nested
    /// navigations: `"Customer.Address"`, `"Lines.Product"`.
    pub fn include(&self, path: &str) -> QuarryResult<Self> {
        self.include_inner(path, None)
    }

    /// Load a navigation, keeping only related rows matching `filter`.
    pub fn include_where(&self, path: &str, filter: ScalarExpr) -> QuarryResult<Self> {
        self.include_inner(path, Some(filter))
    }

    fn include_inner(&self, path: &str, filter: Option<ScalarExpr>) -> QuarryResult<Self> {
        validate_include_path(&self.root, &self.registry, path)?;
        Ok(self.wrap(QueryNode::Include {
            source: Arc::clone(&self.node),
            path: path.to_string(),
            filter,
        }))
    }
}

impl<T: 'static> Query<T> {
    fn wrap<U>(&self, node: QueryNode) -> Query<U> {
        Query {
            node: Arc::new(node),
            root: Arc::clone(&self.root),
            registry: Arc::clone(&self.registry),
            _marker: PhantomData,
        }
    }

    pub fn node(&self) -> &Arc<QueryNode> {
        &self.node
    }

    /// Metadata of the entity the query starts from.
    pub fn root(&self) -> &Arc<EntityMetadata> {
        &self.root
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn filter(&self, predicate: ScalarExpr) -> Self {
        self.wrap(QueryNode::Filter {
            source: Arc::clone(&self.node),
            predicate,
        })
    }

    /// Project each row; a `new_object` selector yields one column per member.
    pub fn project(&self, selector: ScalarExpr) -> Query<Record> {
        self.wrap(QueryNode::Project {
            source: Arc::clone(&self.node),
            selector,
            target: None,
        })
    }

    /// Project each row onto entity `U` (`member_init::<U>([...])`).
    pub fn select_as<U: Entity>(&self, selector: ScalarExpr) -> Query<U> {
        self.wrap(QueryNode::Project {
            source: Arc::clone(&self.node),
            selector,
            target: Some(self.registry.describe::<U>()),
        })
    }

    fn join_node<U>(
        &self,
        kind: JoinKind,
        inner: &Query<U>,
        binding: &str,
        keys: Option<(ScalarExpr, ScalarExpr)>,
    ) -> Self {
        let (on_left, on_right) = match keys {
            Some((left, right)) => (Some(left), Some(right)),
            None => (None, None),
        };
        self.wrap(QueryNode::Join {
            source: Arc::clone(&self.node),
            kind,
            inner: Arc::clone(&inner.node),
            binding: binding.to_string(),
            on_left,
            on_right,
        })
    }

    /// Inner join on `outer_key = inner_key`; inner rows are `source(binding)`.
    pub fn join<U>(
        &self,
        inner: &Query<U>,
        binding: &str,
        outer_key: ScalarExpr,
        inner_key: ScalarExpr,
    ) -> Self {
        self.join_node(JoinKind::Inner, inner, binding, Some((outer_key, inner_key)))
    }

    pub fn left_join<U>(
        &self,
        inner: &Query<U>,
        binding: &str,
        outer_key: ScalarExpr,
        inner_key: ScalarExpr,
    ) -> Self {
        self.join_node(JoinKind::Left, inner, binding, Some((outer_key, inner_key)))
    }

    pub fn right_join<U>(
        &self,
        inner: &Query<U>,
        binding: &str,
        outer_key: ScalarExpr,
        inner_key: ScalarExpr,
    ) -> Self {
        self.join_node(JoinKind::Right, inner, binding, Some((outer_key, inner_key)))
    }

    pub fn cross_join<U>(&self, inner: &Query<U>, binding: &str) -> Self {
        self.join_node(JoinKind::Cross, inner, binding, None)
    }

    /// Group rows by `key`; a `new_object` key groups by several members.
    pub fn group_by(&self, key: ScalarExpr) -> Query<Grouping<T>> {
        self.wrap(QueryNode::GroupBy {
            source: Arc::clone(&self.node),
            key,
        })
    }

    fn order(&self, key: ScalarExpr, direction: SortDirection, then: bool) -> Self {
        self.wrap(QueryNode::OrderBy {
            source: Arc::clone(&self.node),
            key,
            direction,
            then,
        })
    }

    pub fn order_by(&self, key: ScalarExpr) -> Self {
        self.order(key, SortDirection::Ascending, false)
    }

    pub fn order_by_descending(&self, key: ScalarExpr) -> Self {
        self.order(key, SortDirection::Descending, false)
    }

    pub fn then_by(&self, key: ScalarExpr) -> Self {
        self.order(key, SortDirection::Ascending, true)
    }

    pub fn then_by_descending(&self, key: ScalarExpr) -> Self {
        self.order(key, SortDirection::Descending, true)
    }

    /// Skip `count` rows. Requires an ordering; checked at compile time.
    pub fn skip(&self, count: i64) -> Self {
        self.wrap(QueryNode::Skip {
            source: Arc::clone(&self.node),
            count,
        })
    }

    pub fn take(&self, count: i64) -> Self {
        self.wrap(QueryNode::Take {
            source: Arc::clone(&self.node),
            count,
        })
    }

    pub fn distinct(&self) -> Self {
        self.wrap(QueryNode::Distinct {
            source: Arc::clone(&self.node),
        })
    }

    /// Rows of both queries, duplicates kept.
    pub fn union(&self, other: &Query<T>) -> Self {
        self.wrap(QueryNode::Union {
            source: Arc::clone(&self.node),
            other: Arc::clone(&other.node),
        })
    }

    pub fn any(&self) -> Query<bool> {
        self.wrap(QueryNode::Any {
            source: Arc::clone(&self.node),
            predicate: None,
        })
    }

    pub fn any_where(&self, predicate: ScalarExpr) -> Query<bool> {
        self.wrap(QueryNode::Any {
            source: Arc::clone(&self.node),
            predicate: Some(predicate),
        })
    }

    fn aggregate<U>(&self, kind: AggregateKind, selector: Option<ScalarExpr>) -> Query<U> {
        self.wrap(QueryNode::Aggregate {
            source: Arc::clone(&self.node),
            kind,
            selector,
        })
    }

    pub fn count(&self) -> Query<i64> {
        self.aggregate(AggregateKind::Count, None)
    }

    pub fn count_where(&self, predicate: ScalarExpr) -> Query<i64> {
        self.filter(predicate).count()
    }

    pub fn sum(&self, selector: ScalarExpr) -> Query<Value> {
        self.aggregate(AggregateKind::Sum, Some(selector))
    }

    pub fn avg(&self, selector: ScalarExpr) -> Query<Value> {
        self.aggregate(AggregateKind::Avg, Some(selector))
    }

    pub fn min(&self, selector: ScalarExpr) -> Query<Value> {
        self.aggregate(AggregateKind::Min, Some(selector))
    }

    pub fn max(&self, selector: ScalarExpr) -> Query<Value> {
        self.aggregate(AggregateKind::Max, Some(selector))
    }

    /// Update the matching rows: `(field, new value)` pairs.
    pub fn update_set<'a>(&self, set: impl IntoIterator<Item = (&'a str, ScalarExpr)>) -> Mutation {
        let set = set
            .into_iter()
            .map(|(field, expr)| (field.to_string(), expr))
            .collect();
        Mutation::from_node(
            QueryNode::Update {
                source: Arc::clone(&self.node),
                set,
            },
            Arc::clone(&self.registry),
        )
    }

    /// Delete the matching rows.
    pub fn delete(&self) -> Mutation {
        Mutation::from_node(
            QueryNode::Delete {
                source: Arc::clone(&self.node),
            },
            Arc::clone(&self.registry),
        )
    }
}

/// Check that every segment of `path` names a declared navigation, and that
/// collections hang directly off the root.
fn validate_include_path(
    root: &Arc<EntityMetadata>,
    registry: &MetadataRegistry,
    path: &str,
) -> QuarryResult<()> {
    if path.is_empty() {
        return Err(QuarryError::validation("include", "empty navigation path"));
    }

    let mut current = Arc::clone(root);
    for (depth, segment) in path.split('.').enumerate() {
        let link = current.link(segment).ok_or_else(|| {
            let message = match current.column(segment) {
                Some(_) => format!(
                    "{}.{} is a column, not a navigation with a declared foreign key",
                    current.type_name, segment
                ),
                None => format!("{} has no navigation named {}", current.type_name, segment),
            };
            QuarryError::validation("include", message)
        })?;
        if link.is_collection && depth > 0 {
            return Err(QuarryError::validation(
                "include",
                format!("collection {segment} in {path} can only be included from the root entity"),
            ));
        }
        let next = link.target_metadata(registry);
        current = next;
    }
    Ok(())
}
