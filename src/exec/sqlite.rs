//! SQLite reference provider over `rusqlite`.
//!
//! Every statement of a round trip is prepared and run in order on one
//! connection; row-producing statements are buffered into a
//! [`BufferedCursor`]. The async variant moves the same work onto tokio's
//! blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use tracing::debug;

use crate::command::{RoundTrip, Statement};
use crate::sql::Dialect;
use crate::value::{TypeHint, Value};

use super::cursor::{BufferedCursor, ResultSet};
use super::provider::{
    AsyncConnection, Connection, Cursor, ProviderError, ProviderResult, ValueEncoder,
};

impl From<rusqlite::Error> for ProviderError {
    fn from(err: rusqlite::Error) -> Self {
        ProviderError::wrap(err.to_string(), err)
    }
}

struct State {
    conn: rusqlite::Connection,
    open: bool,
}

/// A SQLite database shared by every clone of this handle.
#[derive(Clone)]
pub struct SqliteConnection {
    state: Arc<Mutex<State>>,
}

impl SqliteConnection {
    pub fn open_in_memory() -> ProviderResult<Self> {
        Ok(Self::wrap(rusqlite::Connection::open_in_memory()?))
    }

    pub fn open_path(path: impl AsRef<Path>) -> ProviderResult<Self> {
        Ok(Self::wrap(rusqlite::Connection::open(path)?))
    }

    fn wrap(conn: rusqlite::Connection) -> Self {
        Self {
            state: Arc::new(Mutex::new(State { conn, open: false })),
        }
    }

    /// Run semicolon-separated SQL directly, e.g. to create a schema.
    pub fn execute_script(&self, sql: &str) -> ProviderResult<()> {
        self.lock()?.conn.execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self) -> ProviderResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| ProviderError::new("the SQLite connection lock is poisoned"))
    }

    fn set_open(&self, open: bool) -> ProviderResult<()> {
        self.lock()?.open = open;
        Ok(())
    }

    fn batch(&self, sql: &str) -> ProviderResult<()> {
        let state = self.lock()?;
        if !state.open {
            return Err(ProviderError::new("the connection is not open"));
        }
        state.conn.execute_batch(sql)?;
        Ok(())
    }

    fn run(&self, trip: &RoundTrip, timeout: Option<Duration>) -> ProviderResult<BufferedCursor> {
        if trip.dialect != Dialect::Sqlite {
            return Err(ProviderError::new(format!(
                "SQLite cannot run SQL generated for the {} dialect",
                trip.dialect
            )));
        }
        let state = self.lock()?;
        if !state.open {
            return Err(ProviderError::new("the connection is not open"));
        }
        state.conn.busy_timeout(timeout.unwrap_or(Duration::ZERO))?;

        let mut sets = Vec::new();
        let mut affected = 0u64;
        for (index, statement) in trip.statements.iter().enumerate() {
            match run_statement(&state.conn, statement) {
                Ok(Outcome::Rows(set)) => sets.push(set),
                Ok(Outcome::Affected(n)) => affected += n,
                Err(err) => return Err(err.at_statement(index)),
            }
        }
        debug!(statements = trip.statements.len(), result_sets = sets.len(), affected, "ran round trip");
        Ok(BufferedCursor::new(sets, affected))
    }
}

enum Outcome {
    Rows(ResultSet),
    Affected(u64),
}

fn run_statement(conn: &rusqlite::Connection, statement: &Statement) -> ProviderResult<Outcome> {
    let mut prepared = conn.prepare(&statement.sql)?;
    for param in &statement.params {
        let marker = format!(":{}", param.name);
        let index = prepared.parameter_index(&marker)?.ok_or_else(|| {
            ProviderError::new(format!("statement has no parameter {marker}"))
        })?;
        prepared.raw_bind_parameter(index, SqliteEncoder.encode(&param.value, param.hint)?)?;
    }

    if !statement.produces_rows {
        let changed = prepared.raw_execute()?;
        return Ok(Outcome::Affected(changed as u64));
    }

    let columns: Vec<String> = prepared.column_names().into_iter().map(String::from).collect();
    let count = columns.len();
    let mut set = ResultSet {
        columns,
        rows: Vec::new(),
    };
    let mut rows = prepared.raw_query();
    while let Some(row) = rows.next()? {
        let values = (0..count)
            .map(|i| row.get_ref(i).map(from_sqlite))
            .collect::<Result<Vec<_>, _>>()?;
        set.rows.push(values);
    }
    Ok(Outcome::Rows(set))
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int(n),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

impl Connection for SqliteConnection {
    fn open(&mut self) -> ProviderResult<()> {
        self.set_open(true)
    }

    fn close(&mut self) -> ProviderResult<()> {
        self.set_open(false)
    }

    fn begin(&mut self) -> ProviderResult<()> {
        self.batch("BEGIN")
    }

    fn commit(&mut self) -> ProviderResult<()> {
        self.batch("COMMIT")
    }

    fn rollback(&mut self) -> ProviderResult<()> {
        self.batch("ROLLBACK")
    }

    fn execute(&mut self, trip: &RoundTrip, timeout: Option<Duration>) -> ProviderResult<Box<dyn Cursor>> {
        Ok(Box::new(self.run(trip, timeout)?))
    }
}

/// Encodes values the way SQLite stores them: booleans as 0/1, dates and
/// times as ISO text, GUIDs as hyphenated text.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteEncoder;

impl ValueEncoder for SqliteEncoder {
    type Wire = SqliteValue;

    fn encode(&self, value: &Value, hint: TypeHint) -> ProviderResult<SqliteValue> {
        Ok(match value {
            Value::Null => SqliteValue::Null,
            Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
            Value::Int(n) if matches!(hint, TypeHint::Float | TypeHint::Decimal) => {
                SqliteValue::Real(*n as f64)
            }
            Value::Int(n) => SqliteValue::Integer(*n),
            Value::Float(f) => SqliteValue::Real(*f),
            Value::Text(s) => SqliteValue::Text(s.clone()),
            Value::Bytes(b) => SqliteValue::Blob(b.clone()),
            Value::Date(d) => SqliteValue::Text(d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => SqliteValue::Text(t.format("%H:%M:%S%.f").to_string()),
            Value::DateTime(dt) => SqliteValue::Text(dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string()),
            Value::Guid(g) => SqliteValue::Text(g.hyphenated().to_string()),
        })
    }
}

/// [`SqliteConnection`] behind the async provider traits.
#[derive(Clone)]
pub struct AsyncSqliteConnection {
    inner: SqliteConnection,
}

impl AsyncSqliteConnection {
    pub fn new(inner: SqliteConnection) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &SqliteConnection {
        &self.inner
    }

    async fn blocking<T, F>(&self, work: F) -> ProviderResult<T>
    where
        T: Send + 'static,
        F: FnOnce(SqliteConnection) -> ProviderResult<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || work(inner))
            .await
            .map_err(|e| ProviderError::wrap("the SQLite task did not complete", e))?
    }
}

#[async_trait]
impl AsyncConnection for AsyncSqliteConnection {
    async fn open(&mut self) -> ProviderResult<()> {
        self.blocking(|c| c.set_open(true)).await
    }

    async fn close(&mut self) -> ProviderResult<()> {
        self.blocking(|c| c.set_open(false)).await
    }

    async fn begin(&mut self) -> ProviderResult<()> {
        self.blocking(|c| c.batch("BEGIN")).await
    }

    async fn commit(&mut self) -> ProviderResult<()> {
        self.blocking(|c| c.batch("COMMIT")).await
    }

    async fn rollback(&mut self) -> ProviderResult<()> {
        self.blocking(|c| c.batch("ROLLBACK")).await
    }

    async fn execute(
        &mut self,
        trip: &RoundTrip,
        timeout: Option<Duration>,
    ) -> ProviderResult<Box<dyn Cursor>> {
        let trip = trip.clone();
        let cursor = self.blocking(move |c| c.run(&trip, timeout)).await?;
        Ok(Box::new(cursor))
    }
}
