//! Traits implemented by database providers.
//!
//! The core never talks to a database directly. A provider supplies a
//! [`Connection`] (or [`AsyncConnection`]) that runs a [`RoundTrip`] and
//! hands back a forward-only [`Cursor`] over its result sets.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::command::RoundTrip;
use crate::value::{TypeHint, Value};

/// Result type for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// A failure reported by the provider.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ProviderError {
    message: String,
    /// Statement of the round trip that failed, when known.
    statement: Option<usize>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            statement: None,
            source: None,
        }
    }

    /// Wrap a driver error.
    pub fn wrap(message: impl Into<String>, source: impl StdError + Send + Sync + 'static) -> Self {
        Self {
            message: message.into(),
            statement: None,
            source: Some(Box::new(source)),
        }
    }

    /// Record which statement of the round trip failed.
    pub fn at_statement(mut self, statement: usize) -> Self {
        self.statement = Some(statement);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn statement(&self) -> Option<usize> {
        self.statement
    }
}

/// A forward-only reader over one or more result sets.
///
/// A fresh cursor is positioned before the first row of its first result
/// set. `next_result_set` moves to the start of the next one.
pub trait Cursor: Send {
    /// Column names of the current result set.
    fn columns(&self) -> &[String];

    /// Advance to the next row; `false` once the result set is exhausted.
    fn next_row(&mut self) -> ProviderResult<bool>;

    /// Value of the current row at `ordinal`.
    fn get(&self, ordinal: usize) -> ProviderResult<Value>;

    /// Advance to the next result set; `false` when there is none.
    fn next_result_set(&mut self) -> ProviderResult<bool>;

    /// Rows changed by statements that returned no rows.
    fn records_affected(&self) -> u64;
}

/// A blocking connection.
pub trait Connection: Send {
    fn open(&mut self) -> ProviderResult<()>;

    fn close(&mut self) -> ProviderResult<()>;

    fn begin(&mut self) -> ProviderResult<()>;

    fn commit(&mut self) -> ProviderResult<()>;

    fn rollback(&mut self) -> ProviderResult<()>;

    /// Run every statement of `trip` in order. `timeout` applies to each
    /// statement.
    fn execute(&mut self, trip: &RoundTrip, timeout: Option<Duration>) -> ProviderResult<Box<dyn Cursor>>;
}

/// A connection whose calls suspend instead of blocking.
#[async_trait]
pub trait AsyncConnection: Send {
    async fn open(&mut self) -> ProviderResult<()>;

    async fn close(&mut self) -> ProviderResult<()>;

    async fn begin(&mut self) -> ProviderResult<()>;

    async fn commit(&mut self) -> ProviderResult<()>;

    async fn rollback(&mut self) -> ProviderResult<()>;

    async fn execute(
        &mut self,
        trip: &RoundTrip,
        timeout: Option<Duration>,
    ) -> ProviderResult<Box<dyn Cursor>>;
}

/// Converts bound values into a provider's wire representation.
pub trait ValueEncoder {
    type Wire;

    fn encode(&self, value: &Value, hint: TypeHint) -> ProviderResult<Self::Wire>;
}
