//! The blocking unit of work.

use std::sync::Arc;

use tracing::warn;

use crate::ast::{Mutation, Query};
use crate::command::Command;
use crate::compile::{CompileOptions, ToCommand};
use crate::config::SessionOptions;
use crate::error::{QuarryError, QuarryResult};
use crate::materialize::{convert, DataTable, FromRow, Materializer, MultiReader};
use crate::metadata::{Entity, MetadataRegistry};
use crate::value::FromValue;

use super::batch::{BatchPlan, BatchRun, Step};
use super::changeset::ChangeSet;
use super::cursor::CursorChain;
use super::provider::{Connection, Cursor};

/// One connection, at most one transaction, one logical unit of work.
///
/// The connection opens on first use. Commands sent together run inside a
/// transaction the session opens and closes itself, unless the caller began
/// one with [`Session::begin_transaction`].
///
/// ```ignore
/// let mut session = Session::new(SqliteConnection::open_in_memory()?, options);
/// let recent: Vec<Order> = session.list(&Query::<Order>::table().take(5))?;
/// ```
pub struct Session<C: Connection> {
    connection: C,
    options: SessionOptions,
    registry: Arc<MetadataRegistry>,
    is_open: bool,
    in_transaction: bool,
}

impl<C: Connection> Session<C> {
    pub fn new(connection: C, options: SessionOptions) -> Self {
        Self {
            connection,
            options,
            registry: MetadataRegistry::shared(),
            is_open: false,
            in_transaction: false,
        }
    }

    /// Use `registry` for the mutations this session builds.
    pub fn with_registry(mut self, registry: Arc<MetadataRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn open(&mut self) -> QuarryResult<()> {
        if !self.is_open {
            self.connection.open()?;
            self.is_open = true;
        }
        Ok(())
    }

    /// Roll back an open transaction and close the connection.
    pub fn close(&mut self) -> QuarryResult<()> {
        if self.in_transaction {
            self.connection.rollback()?;
            self.in_transaction = false;
        }
        if self.is_open {
            self.is_open = false;
            self.connection.close()?;
        }
        Ok(())
    }

    pub fn begin_transaction(&mut self) -> QuarryResult<()> {
        if self.in_transaction {
            return Err(QuarryError::validation(
                "transaction",
                "a transaction is already active",
            ));
        }
        self.open()?;
        self.connection.begin()?;
        self.in_transaction = true;
        Ok(())
    }

    pub fn commit(&mut self) -> QuarryResult<()> {
        self.end_transaction("commit")?;
        self.connection.commit()?;
        Ok(())
    }

    pub fn rollback(&mut self) -> QuarryResult<()> {
        self.end_transaction("rollback")?;
        self.connection.rollback()?;
        Ok(())
    }

    fn end_transaction(&mut self, clause: &'static str) -> QuarryResult<()> {
        if !self.in_transaction {
            return Err(QuarryError::validation(clause, "no transaction is active"));
        }
        self.in_transaction = false;
        Ok(())
    }

    /// Compile with this session's dialect and parameterization.
    pub fn compile(&self, query: &impl ToCommand) -> QuarryResult<Command> {
        query.to_command(CompileOptions::from(&self.options))
    }

    /// Run a query and hand back the raw cursor.
    pub fn cursor(&mut self, query: &impl ToCommand) -> QuarryResult<Box<dyn Cursor>> {
        let plan = self.plan(&[query as &dyn ToCommand])?;
        self.run(&plan)
    }

    pub fn scalar<V: FromValue>(&mut self, query: &impl ToCommand) -> QuarryResult<V> {
        let (plan, mut cursor) = self.query(query)?;
        let value = Materializer::new(&plan.commands()[0]).read_scalar(cursor.as_mut())?;
        convert(value)
    }

    /// The first entity the query yields.
    pub fn single<T: Entity>(&mut self, query: &Query<T>) -> QuarryResult<Option<T>> {
        Ok(self.list(query)?.into_iter().next())
    }

    pub fn list<T: Entity>(&mut self, query: &Query<T>) -> QuarryResult<Vec<T>> {
        let (plan, mut cursor) = self.query(query)?;
        Materializer::new(&plan.commands()[0]).read_entities(cursor.as_mut())
    }

    pub fn rows<R: FromRow>(&mut self, query: &impl ToCommand) -> QuarryResult<Vec<R>> {
        let (plan, mut cursor) = self.query(query)?;
        Materializer::new(&plan.commands()[0]).read_rows(cursor.as_mut())
    }

    /// Whether the query yields any row.
    pub fn exists<T: 'static>(&mut self, query: &Query<T>) -> QuarryResult<bool> {
        self.scalar(&query.any())
    }

    pub fn table(&mut self, query: &impl ToCommand) -> QuarryResult<DataTable> {
        let (plan, mut cursor) = self.query(query)?;
        Materializer::new(&plan.commands()[0]).read_table(cursor.as_mut())
    }

    /// Run several queries in as few round trips as the batch size allows
    /// and read their results in order.
    pub fn multiple(&mut self, queries: &[&dyn ToCommand]) -> QuarryResult<MultiReader> {
        let plan = self.plan(queries)?;
        let cursor = self.run(&plan)?;
        Ok(MultiReader::new(cursor, plan.into_commands()))
    }

    /// Run a mutation; returns the rows it affected.
    pub fn execute(&mut self, mutation: &Mutation) -> QuarryResult<u64> {
        let (_, cursor) = self.query(mutation)?;
        Ok(cursor.records_affected())
    }

    /// Insert `entity` and write its generated identity back.
    pub fn insert<T: Entity>(&mut self, entity: &mut T) -> QuarryResult<u64> {
        let mut changes = ChangeSet::with_registry(&self.registry);
        changes.insert(entity);
        self.submit(changes)
    }

    pub fn update<T: Entity>(&mut self, entity: &T) -> QuarryResult<u64> {
        self.execute(&Mutation::update_in(&self.registry, entity))
    }

    pub fn delete<T: Entity>(&mut self, entity: &T) -> QuarryResult<u64> {
        self.execute(&Mutation::delete_in(&self.registry, entity))
    }

    /// Run every change as one batch; returns the rows affected.
    pub fn submit(&mut self, changes: ChangeSet<'_>) -> QuarryResult<u64> {
        let commands = changes.compile(CompileOptions::from(&self.options))?;
        let plan = BatchPlan::new(commands, self.options.batch_size);
        let cursor = self.run(&plan)?;
        let mut reader = MultiReader::new(cursor, plan.into_commands());
        changes.assign_identities(&mut reader)?;
        Ok(reader.records_affected())
    }

    fn plan(&self, queries: &[&dyn ToCommand]) -> QuarryResult<BatchPlan> {
        let options = CompileOptions::from(&self.options);
        let commands = queries
            .iter()
            .map(|q| q.to_command(options))
            .collect::<QuarryResult<Vec<_>>>()?;
        Ok(BatchPlan::new(commands, self.options.batch_size))
    }

    fn query(&mut self, query: &dyn ToCommand) -> QuarryResult<(BatchPlan, Box<dyn Cursor>)> {
        let plan = self.plan(&[query])?;
        let cursor = self.run(&plan)?;
        Ok((plan, cursor))
    }

    /// Drive a batch to completion, rolling back a transaction the batch
    /// opened if any step fails.
    fn run(&mut self, plan: &BatchPlan) -> QuarryResult<Box<dyn Cursor>> {
        self.open()?;
        let timeout = self.options.timeout;
        let mut run = BatchRun::new(plan, self.in_transaction);
        let mut parts = Vec::new();
        loop {
            let outcome = match run.next() {
                Step::Begin => self.connection.begin(),
                Step::Execute(trip) => self
                    .connection
                    .execute(trip, timeout)
                    .map(|cursor| parts.push((cursor, trip.result_set_count()))),
                Step::Commit => self.connection.commit(),
                Step::Done => break,
            };
            if let Err(err) = outcome {
                if run.fail() {
                    warn!(error = %err, "rolling back batch");
                    if let Err(rollback) = self.connection.rollback() {
                        warn!(error = %rollback, "rollback failed");
                    }
                }
                return Err(run.error(err));
            }
        }
        Ok(Box::new(CursorChain::new(parts)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::field;
    use crate::command::RoundTrip;
    use crate::exec::cursor::{BufferedCursor, ResultSet};
    use crate::exec::provider::{ProviderError, ProviderResult};
    use crate::sql::Dialect;
    use crate::test_fixtures::{registry, Customer, Line};
    use crate::value::Value;
    use std::time::Duration;

    /// Records calls; fails the round trip whose index is `fail_at`.
    #[derive(Default)]
    struct Scripted {
        calls: Vec<String>,
        fail_at: Option<usize>,
        fail_rollback: bool,
        trips: usize,
        sets: Vec<ResultSet>,
    }

    impl Connection for Scripted {
        fn open(&mut self) -> ProviderResult<()> {
            self.calls.push("open".into());
            Ok(())
        }

        fn close(&mut self) -> ProviderResult<()> {
            self.calls.push("close".into());
            Ok(())
        }

        fn begin(&mut self) -> ProviderResult<()> {
            self.calls.push("begin".into());
            Ok(())
        }

        fn commit(&mut self) -> ProviderResult<()> {
            self.calls.push("commit".into());
            Ok(())
        }

        fn rollback(&mut self) -> ProviderResult<()> {
            self.calls.push("rollback".into());
            if self.fail_rollback {
                return Err(ProviderError::new("connection lost"));
            }
            Ok(())
        }

        fn execute(
            &mut self,
            trip: &RoundTrip,
            timeout: Option<Duration>,
        ) -> ProviderResult<Box<dyn Cursor>> {
            self.calls.push(format!("execute {} {:?}", trip.statements.len(), timeout));
            let index = self.trips;
            self.trips += 1;
            if self.fail_at == Some(index) {
                return Err(ProviderError::new("boom").at_statement(0));
            }
            let sets = std::mem::take(&mut self.sets);
            Ok(Box::new(BufferedCursor::new(sets, 1)))
        }
    }

    fn session(connection: Scripted) -> Session<Scripted> {
        let options = SessionOptions::for_dialect(Dialect::Sqlite)
            .with_batch_size(2)
            .with_timeout(Some(Duration::from_secs(5)));
        Session::new(connection, options).with_registry(registry())
    }

    fn line(product: &str) -> Line {
        Line {
            order_id: 1,
            product: product.into(),
            quantity: 1,
            price: 1.0,
            ..Line::default()
        }
    }

    #[test]
    fn test_single_query_opens_lazily_without_transaction() {
        let mut session = session(Scripted {
            sets: vec![ResultSet::new(["Value"]).with_row([Value::Int(2)])],
            ..Scripted::default()
        });
        let query = Query::<Customer>::table_in(session.registry()).count();
        let count: i64 = session.scalar(&query).unwrap();
        assert_eq!(count, 2);
        assert_eq!(session.connection().calls, ["open", "execute 1 Some(5s)"]);
    }

    #[test]
    fn test_batch_failure_rolls_back() {
        let mut session = session(Scripted {
            fail_at: Some(1),
            ..Scripted::default()
        });
        let (mut a, mut b, mut c) = (line("a"), line("b"), line("c"));
        let mut changes = ChangeSet::with_registry(session.registry());
        changes.insert(&mut a).insert(&mut b).insert(&mut c);
        let err = session.submit(changes).unwrap_err();

        assert_eq!(
            session.connection().calls,
            ["open", "begin", "execute 4 Some(5s)", "execute 2 Some(5s)", "rollback"]
        );
        // the failed trip starts with the third insert
        let command = err.command().unwrap();
        assert_eq!(command.params()[1].value, Value::Text("c".into()));
    }

    #[test]
    fn test_external_transaction_is_not_rolled_back() {
        let mut session = session(Scripted {
            fail_at: Some(0),
            ..Scripted::default()
        });
        session.begin_transaction().unwrap();
        let registry = Arc::clone(session.registry());
        let mutation = Query::<Customer>::table_in(&registry)
            .filter(field("Active").not())
            .delete();
        assert!(session.execute(&mutation).is_err());
        assert!(session.in_transaction());
        session.rollback().unwrap();
        assert_eq!(
            session.connection().calls,
            ["open", "begin", "execute 1 Some(5s)", "rollback"]
        );
    }

    #[test]
    fn test_transaction_state_is_checked() {
        let mut session = session(Scripted::default());
        assert!(session.commit().unwrap_err().is_validation());
        session.begin_transaction().unwrap();
        assert!(session.begin_transaction().unwrap_err().is_validation());
        session.close().unwrap();
        assert!(!session.in_transaction());
        assert_eq!(session.connection().calls, ["open", "begin", "rollback", "close"]);
    }

    #[test]
    fn test_failed_close_keeps_transaction_flag() {
        let mut session = session(Scripted {
            fail_rollback: true,
            ..Scripted::default()
        });
        session.begin_transaction().unwrap();
        assert!(session.close().is_err());
        assert!(session.in_transaction());
    }

    #[test]
    fn test_insert_assigns_identity() {
        let mut session = session(Scripted {
            sets: vec![ResultSet::new(["Id"]).with_row([Value::Int(41)])],
            ..Scripted::default()
        });
        let mut entity = line("x");
        session.insert(&mut entity).unwrap();
        assert_eq!(entity.id, 41);
    }
}
