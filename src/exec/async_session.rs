//! The suspending unit of work.
//!
//! Mirrors [`Session`](super::Session) over an [`AsyncConnection`]; batching
//! and transaction decisions come from the same [`BatchRun`], so only the
//! provider calls are awaited.

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
use super::provider::{AsyncConnection, Cursor};

/// A compilable query that can be held across an await.
pub type SharedQuery<'q> = &'q (dyn ToCommand + Sync);

pub struct AsyncSession<C: AsyncConnection> {
    connection: C,
    options: SessionOptions,
    registry: Arc<MetadataRegistry>,
    is_open: bool,
    in_transaction: bool,
}

impl<C: AsyncConnection> AsyncSession<C> {
    pub fn new(connection: C, options: SessionOptions) -> Self {
        Self {
            connection,
            options,
            registry: MetadataRegistry::shared(),
            is_open: false,
            in_transaction: false,
        }
    }

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

    pub async fn open(&mut self) -> QuarryResult<()> {
        if !self.is_open {
            self.connection.open().await?;
            self.is_open = true;
        }
        Ok(())
    }

    pub async fn close(&mut self) -> QuarryResult<()> {
        if self.in_transaction {
            self.connection.rollback().await?;
            self.in_transaction = false;
        }
        if self.is_open {
            self.is_open = false;
            self.connection.close().await?;
        }
        Ok(())
    }

    pub async fn begin_transaction(&mut self) -> QuarryResult<()> {
        if self.in_transaction {
            return Err(QuarryError::validation(
                "transaction",
                "a transaction is already active",
            ));
        }
        self.open().await?;
        self.connection.begin().await?;
        self.in_transaction = true;
        Ok(())
    }

    pub async fn commit(&mut self) -> QuarryResult<()> {
        self.end_transaction("commit")?;
        self.connection.commit().await?;
        Ok(())
    }

    pub async fn rollback(&mut self) -> QuarryResult<()> {
        self.end_transaction("rollback")?;
        self.connection.rollback().await?;
        Ok(())
    }

    fn end_transaction(&mut self, clause: &'static str) -> QuarryResult<()> {
        if !self.in_transaction {
            return Err(QuarryError::validation(clause, "no transaction is active"));
        }
        self.in_transaction = false;
        Ok(())
    }

    pub fn compile(&self, query: &impl ToCommand) -> QuarryResult<Command> {
        query.to_command(CompileOptions::from(&self.options))
    }

    pub async fn cursor(&mut self, query: &(impl ToCommand + Sync)) -> QuarryResult<Box<dyn Cursor>> {
        let (_, cursor) = self.query(query).await?;
        Ok(cursor)
    }

    pub async fn scalar<V: FromValue>(&mut self, query: &(impl ToCommand + Sync)) -> QuarryResult<V> {
        let (plan, mut cursor) = self.query(query).await?;
        let value = Materializer::new(&plan.commands()[0]).read_scalar(cursor.as_mut())?;
        convert(value)
    }

    pub async fn single<T: Entity>(&mut self, query: &Query<T>) -> QuarryResult<Option<T>> {
        Ok(self.list(query).await?.into_iter().next())
    }

    pub async fn list<T: Entity>(&mut self, query: &Query<T>) -> QuarryResult<Vec<T>> {
        let (plan, mut cursor) = self.query(query).await?;
        Materializer::new(&plan.commands()[0]).read_entities(cursor.as_mut())
    }

    pub async fn rows<R: FromRow>(&mut self, query: &(impl ToCommand + Sync)) -> QuarryResult<Vec<R>> {
        let (plan, mut cursor) = self.query(query).await?;
        Materializer::new(&plan.commands()[0]).read_rows(cursor.as_mut())
    }

    pub async fn exists<T: 'static>(&mut self, query: &Query<T>) -> QuarryResult<bool> {
        self.scalar(&query.any()).await
    }

    pub async fn table(&mut self, query: &(impl ToCommand + Sync)) -> QuarryResult<DataTable> {
        let (plan, mut cursor) = self.query(query).await?;
        Materializer::new(&plan.commands()[0]).read_table(cursor.as_mut())
    }

    pub async fn multiple(&mut self, queries: &[SharedQuery<'_>]) -> QuarryResult<MultiReader> {
        let plan = self.plan(queries)?;
        let cursor = self.run(&plan).await?;
        Ok(MultiReader::new(cursor, plan.into_commands()))
    }

    pub async fn execute(&mut self, mutation: &Mutation) -> QuarryResult<u64> {
        let (_, cursor) = self.query(mutation).await?;
        Ok(cursor.records_affected())
    }

    pub async fn insert<T: Entity>(&mut self, entity: &mut T) -> QuarryResult<u64> {
        let mut changes = ChangeSet::with_registry(&self.registry);
        changes.insert(entity);
        self.submit(changes).await
    }

    pub async fn update<T: Entity>(&mut self, entity: &T) -> QuarryResult<u64> {
        let mutation = Mutation::update_in(&self.registry, entity);
        self.execute(&mutation).await
    }

    pub async fn delete<T: Entity>(&mut self, entity: &T) -> QuarryResult<u64> {
        let mutation = Mutation::delete_in(&self.registry, entity);
        self.execute(&mutation).await
    }

    pub async fn submit(&mut self, changes: ChangeSet<'_>) -> QuarryResult<u64> {
        let commands = changes.compile(CompileOptions::from(&self.options))?;
        let plan = BatchPlan::new(commands, self.options.batch_size);
        let cursor = self.run(&plan).await?;
        let mut reader = MultiReader::new(cursor, plan.into_commands());
        changes.assign_identities(&mut reader)?;
        Ok(reader.records_affected())
    }

    fn plan(&self, queries: &[SharedQuery<'_>]) -> QuarryResult<BatchPlan> {
        let options = CompileOptions::from(&self.options);
        let commands = queries
            .iter()
            .map(|q| q.to_command(options))
            .collect::<QuarryResult<Vec<_>>>()?;
        Ok(BatchPlan::new(commands, self.options.batch_size))
    }

    async fn query(&mut self, query: SharedQuery<'_>) -> QuarryResult<(BatchPlan, Box<dyn Cursor>)> {
        let plan = self.plan(&[query])?;
        let cursor = self.run(&plan).await?;
        Ok((plan, cursor))
    }

    async fn run(&mut self, plan: &BatchPlan) -> QuarryResult<Box<dyn Cursor>> {
        self.open().await?;
        let timeout = self.options.timeout;
        let mut run = BatchRun::new(plan, self.in_transaction);
        let mut parts = Vec::new();
        loop {
            let outcome = match run.next() {
                Step::Begin => self.connection.begin().await,
                Step::Execute(trip) => self
                    .connection
                    .execute(trip, timeout)
                    .await
                    .map(|cursor| parts.push((cursor, trip.result_set_count()))),
                Step::Commit => self.connection.commit().await,
                Step::Done => break,
            };
            if let Err(err) = outcome {
                if run.fail() {
                    warn!(error = %err, "rolling back batch");
                    if let Err(rollback) = self.connection.rollback().await {
                        warn!(error = %rollback, "rollback failed");
                    }
                }
                return Err(run.error(err));
            }
        }
        Ok(Box::new(CursorChain::new(parts)))
    }
}
