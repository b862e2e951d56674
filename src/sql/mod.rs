//! SQL generation module.
//!
//! This module provides a type-safe SQL builder that generates multi-dialect SQL.
//! It includes:
//!
//! - [`query`] - SELECT query builder
//! - [`expr`] - Expression AST and builder DSL
//! - [`dml`] - Data Manipulation Language (INSERT, UPDATE, DELETE)
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations

pub mod dialect;
pub mod dml;
pub mod expr;
pub mod query;
pub mod token;

/// Syntax checks for generated SQL, shared with the integration tests.
#[doc(hidden)]
pub mod test_utils;

// Re-export commonly used types at the sql module level
pub use dialect::{CastTarget, DatePart, Dialect, MutationStyle, SqlDialect};
pub use dml::{Delete, Insert, Update};
pub use expr::{BinaryOperator, Expr, Literal, UnaryOperator};
pub use query::{FromSource, Join, JoinType, LimitOffset, OrderByExpr, Query, SelectExpr, SortDir, TableRef};
pub use token::{Token, TokenStream};
