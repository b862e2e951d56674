//! # Quarry
//!
//! A typed query compiler and result materializer for relational databases.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Query<T> / Mutation  (fluent builder)          │
//! │  filter, project, join, group_by, order_by, include ..  │
//! └─────────────────────────────────────────────────────────┘
//!                          │  QueryNode tree (Arc-shared)
//!                          ▼ [compile]
//! ┌─────────────────────────────────────────────────────────┐
//! │   alias registry · scalar visitor · function resolver   │
//! │   clause levels and nesting  ──▶  sql::Query / DML      │
//! └─────────────────────────────────────────────────────────┘
//!                          │  Command (tokens, params, column map)
//!                          ▼ [exec]
//! ┌─────────────────────────────────────────────────────────┐
//! │   BatchPlan / BatchRun  ──▶  Session | AsyncSession     │
//! │   Connection (provider)  ──▶  Cursor                    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [materialize]
//! ┌─────────────────────────────────────────────────────────┐
//! │   entities (split-sentinel hydration), scalars,         │
//! │   tuples, DataTable                                     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! SQL is generated for T-SQL, MySQL, PostgreSQL and SQLite; SQLite ships
//! as the reference provider.

pub mod ast;
pub mod command;
pub mod compile;
pub mod config;
pub mod error;
pub mod exec;
pub mod materialize;
pub mod metadata;
pub mod sql;
pub mod value;

#[cfg(test)]
mod test_fixtures;

pub use error::{QuarryError, QuarryResult};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::ast::{
        avg, coalesce, count, field, key, lit, max, member_init, min, new_object, now, null,
        source, sum, when, Grouping, Mutation, Query, Record, ScalarExpr,
    };
    pub use crate::command::Command;
    pub use crate::compile::{CompileOptions, ToCommand};
    pub use crate::config::SessionOptions;
    pub use crate::error::{QuarryError, QuarryResult};
    pub use crate::exec::{
        AsyncSession, AsyncSqliteConnection, ChangeSet, Connection, Cursor, Session,
        SqliteConnection,
    };
    pub use crate::materialize::{DataTable, FromRow, MultiReader};
    pub use crate::metadata::{Entity, EntityBuilder, MetadataRegistry};
    pub use crate::sql::Dialect;
    pub use crate::value::{FromValue, SqlValue, TypeHint, Value};
}
