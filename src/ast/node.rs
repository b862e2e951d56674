//! Query nodes.
//!
//! Each node wraps the node it was built from. Nodes are never modified
//! after construction, so a chain can be shared by any number of derived
//! queries.

use std::sync::Arc;

use crate::metadata::EntityMetadata;
use crate::value::Value;

use super::expr::{AggregateKind, ScalarExpr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Rows an insert writes.
#[derive(Debug, Clone)]
pub enum InsertSource {
    /// One entity snapshot: `(field, value)` for every writable column.
    Values(Vec<(String, Value)>),
    /// Rows of a projection whose member names match target fields.
    Query(Arc<QueryNode>),
}

#[derive(Debug, Clone)]
pub enum QueryNode {
    Source {
        entity: Arc<EntityMetadata>,
    },
    Filter {
        source: Arc<QueryNode>,
        predicate: ScalarExpr,
    },
    Project {
        source: Arc<QueryNode>,
        selector: ScalarExpr,
        /// Entity the rows materialize as (`select_as`).
        target: Option<Arc<EntityMetadata>>,
    },
    Join {
        source: Arc<QueryNode>,
        kind: JoinKind,
        inner: Arc<QueryNode>,
        /// Name the inner rows are referenced by (`source("c")`).
        binding: String,
        on_left: Option<ScalarExpr>,
        on_right: Option<ScalarExpr>,
    },
    GroupBy {
        source: Arc<QueryNode>,
        key: ScalarExpr,
    },
    OrderBy {
        source: Arc<QueryNode>,
        key: ScalarExpr,
        direction: SortDirection,
        /// A secondary ordering (`then_by`).
        then: bool,
    },
    Skip {
        source: Arc<QueryNode>,
        count: i64,
    },
    Take {
        source: Arc<QueryNode>,
        count: i64,
    },
    Aggregate {
        source: Arc<QueryNode>,
        kind: AggregateKind,
        selector: Option<ScalarExpr>,
    },
    Distinct {
        source: Arc<QueryNode>,
    },
    Union {
        source: Arc<QueryNode>,
        other: Arc<QueryNode>,
    },
    Any {
        source: Arc<QueryNode>,
        predicate: Option<ScalarExpr>,
    },
    Include {
        source: Arc<QueryNode>,
        /// Dotted navigation path, e.g. `Customer.Address`.
        path: String,
        filter: Option<ScalarExpr>,
    },
    Insert {
        target: Arc<EntityMetadata>,
        values: InsertSource,
    },
    Update {
        source: Arc<QueryNode>,
        set: Vec<(String, ScalarExpr)>,
    },
    Delete {
        source: Arc<QueryNode>,
    },
}

impl QueryNode {
    /// The node this one was built from.
    pub fn source(&self) -> Option<&Arc<QueryNode>> {
        match self {
            QueryNode::Source { .. } | QueryNode::Insert { .. } => None,
            QueryNode::Filter { source, .. }
            | QueryNode::Project { source, .. }
            | QueryNode::Join { source, .. }
            | QueryNode::GroupBy { source, .. }
            | QueryNode::OrderBy { source, .. }
            | QueryNode::Skip { source, .. }
            | QueryNode::Take { source, .. }
            | QueryNode::Aggregate { source, .. }
            | QueryNode::Distinct { source }
            | QueryNode::Union { source, .. }
            | QueryNode::Any { source, .. }
            | QueryNode::Include { source, .. }
            | QueryNode::Update { source, .. }
            | QueryNode::Delete { source } => Some(source),
        }
    }

    /// Name of the operation, used in error messages.
    pub fn clause(&self) -> &'static str {
        match self {
            QueryNode::Source { .. } => "source",
            QueryNode::Filter { .. } => "filter",
            QueryNode::Project { .. } => "project",
            QueryNode::Join { .. } => "join",
            QueryNode::GroupBy { .. } => "group_by",
            QueryNode::OrderBy { then: false, .. } => "order_by",
            QueryNode::OrderBy { then: true, .. } => "then_by",
            QueryNode::Skip { .. } => "skip",
            QueryNode::Take { .. } => "take",
            QueryNode::Aggregate { .. } => "aggregate",
            QueryNode::Distinct { .. } => "distinct",
            QueryNode::Union { .. } => "union",
            QueryNode::Any { .. } => "any",
            QueryNode::Include { .. } => "include",
            QueryNode::Insert { .. } => "insert",
            QueryNode::Update { .. } => "update",
            QueryNode::Delete { .. } => "delete",
        }
    }

    /// The entity at the root of the chain.
    pub fn root_entity(&self) -> Option<&Arc<EntityMetadata>> {
        match self {
            QueryNode::Source { entity } => Some(entity),
            QueryNode::Insert { target, .. } => Some(target),
            other => other.source().and_then(|s| s.root_entity()),
        }
    }

    /// Navigation includes anywhere in the chain, outermost last.
    pub fn includes(&self) -> Vec<(&str, Option<&ScalarExpr>)> {
        let mut found = match self.source() {
            Some(source) => source.includes(),
            None => Vec::new(),
        };
        if let QueryNode::Include { path, filter, .. } = self {
            found.push((path.as_str(), filter.as_ref()));
        }
        found
    }
}
