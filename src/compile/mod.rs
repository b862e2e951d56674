//! Compilation from query trees to SQL commands.
//!
//! ```text
//! Query<T> / Mutation ──▶ select / mutation ──▶ visitor + functions ──▶ sql::Query ──▶ Command
//!                           (levels, nesting)     (scalar expressions)    (tokens)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use quarry::compile::{CompileOptions, ToCommand};
//! use quarry::sql::Dialect;
//!
//! let command = Query::<Order>::table()
//!     .filter(field("CustomerId").eq(7))
//!     .to_command(CompileOptions::new(Dialect::Postgres))?;
//! println!("{}", command.sql());
//! ```

pub(crate) mod alias;
pub(crate) mod context;
pub(crate) mod functions;
pub(crate) mod mutation;
pub(crate) mod select;
pub(crate) mod visitor;

use crate::ast::{Mutation, Query};
use crate::command::Command;
use crate::config::SessionOptions;
use crate::error::QuarryResult;
use crate::sql::Dialect;

/// Options that affect the generated SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// SQL dialect to generate.
    pub dialect: Dialect,
    /// Bind constants as parameters. When off, constants are inlined as
    /// literals.
    pub parameterize: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::TSql,
            parameterize: true,
        }
    }
}

impl CompileOptions {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    /// Set the SQL dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Inline constants instead of binding them.
    pub fn inline(mut self) -> Self {
        self.parameterize = false;
        self
    }
}

impl From<&SessionOptions> for CompileOptions {
    fn from(options: &SessionOptions) -> Self {
        Self {
            dialect: options.dialect,
            parameterize: options.parameterize,
        }
    }
}

/// Anything that compiles to a single [`Command`].
pub trait ToCommand {
    fn to_command(&self, options: CompileOptions) -> QuarryResult<Command>;
}

impl<T: 'static> ToCommand for Query<T> {
    fn to_command(&self, options: CompileOptions) -> QuarryResult<Command> {
        select::compile_select(self.node(), self.registry(), options)
    }
}

impl ToCommand for Mutation {
    fn to_command(&self, options: CompileOptions) -> QuarryResult<Command> {
        mutation::compile_mutation(self.node(), self.registry(), options)
    }
}

/// Compile a query with the given options.
pub fn compile_query<T: 'static>(query: &Query<T>, options: CompileOptions) -> QuarryResult<Command> {
    query.to_command(options)
}

/// Compile an insert, update or delete with the given options.
pub fn compile_mutation(mutation: &Mutation, options: CompileOptions) -> QuarryResult<Command> {
    mutation.to_command(options)
}
