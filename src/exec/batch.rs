//! Batching and transaction decisions, free of I/O.
//!
//! A [`BatchPlan`] groups compiled commands into round trips. A [`BatchRun`]
//! walks the plan as a sequence of [`Step`]s; the blocking and the async
//! session both drive the same run and differ only in how they perform each
//! step.
//!
//! ```text
//!   owned transaction:   Begin ─▶ Execute(trip 0) ─▶ .. ─▶ Execute(trip n) ─▶ Commit ─▶ Done
//!   otherwise:                    Execute(trip 0) ─▶ .. ─▶ Execute(trip n) ─────────────▶ Done
//! ```

use std::ops::Range;

use tracing::{debug, info};

use crate::command::{Command, RoundTrip};
use crate::error::QuarryError;

use super::provider::ProviderError;

struct Trip {
    round_trip: RoundTrip,
    commands: Range<usize>,
    /// Command index of each statement, trailers included.
    statements: Vec<usize>,
}

/// Commands grouped into round trips of at most `batch_size` commands.
pub struct BatchPlan {
    commands: Vec<Command>,
    trips: Vec<Trip>,
}

impl BatchPlan {
    pub fn new(commands: Vec<Command>, batch_size: usize) -> Self {
        let size = batch_size.max(1);
        let mut trips = Vec::new();
        let mut start = 0;
        while start < commands.len() {
            let end = (start + size).min(commands.len());
            let chunk = &commands[start..end];
            let statements = (start..end)
                .flat_map(|i| {
                    let count = 1 + usize::from(commands[i].trailer.is_some());
                    std::iter::repeat(i).take(count)
                })
                .collect();
            trips.push(Trip {
                round_trip: RoundTrip::new(chunk[0].dialect(), chunk),
                commands: start..end,
                statements,
            });
            start = end;
        }
        Self { commands, trips }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    pub fn round_trips(&self) -> impl Iterator<Item = &RoundTrip> {
        self.trips.iter().map(|t| &t.round_trip)
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// The next thing a driver has to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step<'p> {
    Begin,
    /// Run one round trip; its cursor yields `trip.result_set_count()` sets.
    Execute(&'p RoundTrip),
    Commit,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Begun,
    Trip(usize),
    Committing,
    Done,
}

/// One execution of a [`BatchPlan`].
pub struct BatchRun<'p> {
    plan: &'p BatchPlan,
    owns_transaction: bool,
    state: State,
    /// State at the moment the run failed.
    failed: Option<State>,
}

impl<'p> BatchRun<'p> {
    /// Start a run. The run opens its own transaction only when the plan
    /// holds more than one command and the caller has none active.
    pub fn new(plan: &'p BatchPlan, external_transaction: bool) -> Self {
        let owns_transaction = !external_transaction && plan.commands.len() > 1;
        info!(
            round_trips = plan.trips.len(),
            commands = plan.commands.len(),
            owns_transaction,
            "starting batch"
        );
        Self {
            plan,
            owns_transaction,
            state: State::Start,
            failed: None,
        }
    }

    pub fn owns_transaction(&self) -> bool {
        self.owns_transaction
    }

    /// Advance to the next step. Call once per completed step.
    pub fn next(&mut self) -> Step<'p> {
        let trip = match self.state {
            State::Start if self.owns_transaction => {
                self.state = State::Begun;
                return Step::Begin;
            }
            State::Start | State::Begun => 0,
            State::Trip(i) => i + 1,
            State::Committing | State::Done => {
                self.state = State::Done;
                return Step::Done;
            }
        };

        if let Some(current) = self.plan.trips.get(trip) {
            debug!(
                trip,
                commands = current.commands.len(),
                statements = current.round_trip.statements.len(),
                params = current.round_trip.params().count(),
                "executing round trip"
            );
            self.state = State::Trip(trip);
            return Step::Execute(&current.round_trip);
        }

        if self.owns_transaction {
            self.state = State::Committing;
            Step::Commit
        } else {
            self.state = State::Done;
            Step::Done
        }
    }

    /// Record that the current step failed. Returns whether the driver must
    /// roll back the transaction this run opened.
    pub fn fail(&mut self) -> bool {
        let rollback = self.owns_transaction
            && matches!(self.state, State::Trip(_) | State::Committing);
        self.failed = Some(self.state);
        self.state = State::Done;
        rollback
    }

    /// The error to report for a failure of the step last returned, naming
    /// the command that was running. Valid before and after [`fail`](Self::fail).
    pub fn error(&self, source: ProviderError) -> QuarryError {
        let commands = &self.plan.commands;
        let index = match self.failed.unwrap_or(self.state) {
            State::Trip(i) => self.plan.trips.get(i).map(|trip| {
                source
                    .statement()
                    .and_then(|s| trip.statements.get(s).copied())
                    .unwrap_or(trip.commands.start)
            }),
            State::Committing => commands.len().checked_sub(1),
            _ => Some(0),
        };
        match index.and_then(|i| commands.get(i)) {
            Some(command) => QuarryError::execution(command.clone(), source),
            None => QuarryError::Provider(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Mutation;
    use crate::compile::{CompileOptions, ToCommand};
    use crate::sql::Dialect;
    use crate::test_fixtures::{registry, Line};
    use crate::value::Value;

    fn inserts(n: i64) -> Vec<Command> {
        let registry = registry();
        (0..n)
            .map(|i| {
                let line = Line {
                    order_id: 1,
                    product: format!("p{i}"),
                    quantity: 1,
                    price: 2.5,
                    ..Line::default()
                };
                Mutation::insert_in(&registry, &line)
                    .to_command(CompileOptions::new(Dialect::Sqlite))
                    .unwrap()
            })
            .collect()
    }

    fn steps(run: &mut BatchRun<'_>) -> Vec<&'static str> {
        let mut out = Vec::new();
        loop {
            match run.next() {
                Step::Begin => out.push("begin"),
                Step::Execute(_) => out.push("execute"),
                Step::Commit => out.push("commit"),
                Step::Done => break,
            }
        }
        out
    }

    #[test]
    fn test_plan_chunks_by_batch_size() {
        let plan = BatchPlan::new(inserts(5), 2);
        let sizes: Vec<_> = plan.trips.iter().map(|t| t.commands.len()).collect();
        assert_eq!(sizes, [2, 2, 1]);
        // each insert carries an identity trailer
        assert_eq!(plan.trips[0].statements, [0, 0, 1, 1]);
        assert_eq!(plan.trips[1].round_trip.statements[0].params[0].name, "p0");
    }

    #[test]
    fn test_several_commands_own_a_transaction() {
        let plan = BatchPlan::new(inserts(3), 20);
        let mut run = BatchRun::new(&plan, false);
        assert!(run.owns_transaction());
        assert_eq!(steps(&mut run), ["begin", "execute", "commit"]);
    }

    #[test]
    fn test_single_command_runs_bare() {
        let plan = BatchPlan::new(inserts(1), 20);
        let mut run = BatchRun::new(&plan, false);
        assert!(!run.owns_transaction());
        assert_eq!(steps(&mut run), ["execute"]);
    }

    #[test]
    fn test_external_transaction_is_left_alone() {
        let plan = BatchPlan::new(inserts(4), 2);
        let mut run = BatchRun::new(&plan, true);
        assert!(!run.owns_transaction());
        assert_eq!(steps(&mut run), ["execute", "execute"]);
    }

    #[test]
    fn test_failure_names_the_failing_command() {
        let plan = BatchPlan::new(inserts(3), 20);
        let mut run = BatchRun::new(&plan, false);
        assert_eq!(run.next(), Step::Begin);
        assert!(matches!(run.next(), Step::Execute(_)));
        assert!(run.fail());
        // statement 2 is the main statement of the second insert
        let err = run.error(ProviderError::new("constraint failed").at_statement(2));
        let command = err.command().unwrap();
        assert_eq!(command.params()[1].value, Value::Text("p1".into()));
        assert_eq!(run.next(), Step::Done);
    }

    #[test]
    fn test_failure_in_a_later_trip_names_its_command() {
        let plan = BatchPlan::new(inserts(3), 1);
        let mut run = BatchRun::new(&plan, false);
        assert_eq!(run.next(), Step::Begin);
        assert!(matches!(run.next(), Step::Execute(_)));
        assert!(matches!(run.next(), Step::Execute(_)));
        let before = run.error(ProviderError::new("constraint failed"));
        assert!(run.fail());
        let after = run.error(ProviderError::new("constraint failed"));
        assert_eq!(
            before.command().unwrap().params(),
            after.command().unwrap().params()
        );
        assert_eq!(
            after.command().unwrap().params()[1].value,
            Value::Text("p1".into())
        );
    }

    #[test]
    fn test_failed_begin_needs_no_rollback() {
        let plan = BatchPlan::new(inserts(2), 20);
        let mut run = BatchRun::new(&plan, false);
        assert_eq!(run.next(), Step::Begin);
        assert!(!run.fail());
    }

    #[test]
    fn test_external_failure_never_rolls_back() {
        let plan = BatchPlan::new(inserts(2), 20);
        let mut run = BatchRun::new(&plan, true);
        assert!(matches!(run.next(), Step::Execute(_)));
        assert!(!run.fail());
    }
}
