//! Crate-wide error taxonomy.

use thiserror::Error;

use crate::command::Command;
use crate::config::SettingsError;
use crate::exec::ProviderError;
use crate::sql::{Dialect, SqlDialect};
use crate::value::Value;

/// Result type for query compilation, execution and materialization.
pub type QuarryResult<T> = Result<T, QuarryError>;

/// Errors raised while building, compiling, executing or materializing a query.
#[derive(Error, Debug)]
pub enum QuarryError {
    /// A query shape that cannot be compiled faithfully.
    ///
    /// Raised eagerly by the builder or at compile time, never at execution.
    #[error("invalid {clause}: {message}")]
    Validation {
        /// The clause or builder operation at fault (`skip`, `include`, ...).
        clause: &'static str,
        message: String,
    },

    /// A recognized operation the target dialect cannot express.
    #[error("{operation} is not supported by the {dialect} dialect")]
    Translation {
        operation: String,
        dialect: &'static str,
    },

    /// The provider rejected a command.
    #[error("command failed: {source}")]
    Execution {
        /// The command as sent, with its parameters.
        command: Box<Command>,
        #[source]
        source: ProviderError,
    },

    /// A connection-level failure outside any command (open, begin, commit).
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A result row does not fit the requested shape.
    #[error("cannot map row: {message}")]
    Mapping {
        message: String,
        /// The raw row that failed to map.
        row: Vec<Value>,
    },

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl QuarryError {
    /// Create a validation error for the given clause.
    pub fn validation(clause: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            clause,
            message: message.into(),
        }
    }

    /// Create a translation error for an operation the dialect lacks.
    pub fn translation(operation: impl Into<String>, dialect: Dialect) -> Self {
        Self::Translation {
            operation: operation.into(),
            dialect: dialect.name(),
        }
    }

    /// Create an execution error retaining the failed command.
    pub fn execution(command: Command, source: ProviderError) -> Self {
        Self::Execution {
            command: Box::new(command),
            source,
        }
    }

    /// Create a mapping error retaining the raw row.
    pub fn mapping(message: impl Into<String>, row: Vec<Value>) -> Self {
        Self::Mapping {
            message: message.into(),
            row,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    pub fn is_translation(&self) -> bool {
        matches!(self, Self::Translation { .. })
    }

    /// The command attached to an execution error.
    pub fn command(&self) -> Option<&Command> {
        match self {
            Self::Execution { command, .. } => Some(command),
            _ => None,
        }
    }

    /// The raw row attached to a mapping error.
    pub fn row(&self) -> Option<&[Value]> {
        match self {
            Self::Mapping { row, .. } => Some(row),
            _ => None,
        }
    }
}
