//! Query expression trees and the fluent builder that produces them.
//!
//! ```text
//!   Query::<Order>::table()          Source(Orders)
//!     .filter(p)                       └ Filter(p)
//!     .order_by_descending(k)            └ OrderBy(k, desc)
//!     .take(5)                             └ Take(5)
//! ```
//!
//! Nodes point at their predecessor through `Arc`, so every intermediate
//! query stays valid and can be extended independently.

pub mod builder;
pub mod expr;
pub mod mutation;
pub mod node;

pub use builder::{Grouping, Query, Record};
pub use expr::{
    avg, coalesce, count, field, key, lit, max, member_init, min, new_object, now, null, source,
    sum, when, AggregateKind, BinaryOp, Binding, Function, ScalarExpr, UnaryOp,
};
pub use mutation::Mutation;
pub use node::{InsertSource, JoinKind, QueryNode, SortDirection};
