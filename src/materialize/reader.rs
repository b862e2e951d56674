//! Reading the result sets of several commands from one cursor.

use std::collections::VecDeque;

use crate::command::Command;
use crate::error::{QuarryError, QuarryResult};
use crate::exec::Cursor;
use crate::metadata::Entity;
use crate::value::{FromValue, Value};

use super::materializer::Materializer;
use super::row::FromRow;
use super::table::DataTable;

/// Result sets of batched commands, read in submission order.
///
/// Each read consumes the next result set; the cursor moves on only when
/// the following read starts. Commands that yield no rows are skipped.
pub struct MultiReader {
    cursor: Box<dyn Cursor>,
    commands: Vec<Command>,
    /// Command of each unread result set.
    pending: VecDeque<usize>,
    started: bool,
}

impl MultiReader {
    pub(crate) fn new(cursor: Box<dyn Cursor>, commands: Vec<Command>) -> Self {
        let pending = commands
            .iter()
            .enumerate()
            .flat_map(|(i, c)| std::iter::repeat(i).take(c.result_set_count()))
            .collect();
        Self {
            cursor,
            commands,
            pending,
            started: false,
        }
    }

    /// Result sets not read yet.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn records_affected(&self) -> u64 {
        self.cursor.records_affected()
    }

    /// The command whose result set the next read consumes.
    pub fn peek(&self) -> Option<&Command> {
        self.pending.front().map(|&i| &self.commands[i])
    }

    pub fn read_list<T: Entity>(&mut self) -> QuarryResult<Vec<T>> {
        let index = self.advance()?;
        Materializer::new(&self.commands[index]).read_entities(self.cursor.as_mut())
    }

    /// The first entity of the next result set.
    pub fn read_single<T: Entity>(&mut self) -> QuarryResult<Option<T>> {
        Ok(self.read_list()?.into_iter().next())
    }

    pub fn read_rows<R: FromRow>(&mut self) -> QuarryResult<Vec<R>> {
        let index = self.advance()?;
        Materializer::new(&self.commands[index]).read_rows(self.cursor.as_mut())
    }

    pub fn read_scalar<V: FromValue>(&mut self) -> QuarryResult<V> {
        let index = self.advance()?;
        let value = Materializer::new(&self.commands[index]).read_scalar(self.cursor.as_mut())?;
        convert(value)
    }

    pub fn read_table(&mut self) -> QuarryResult<DataTable> {
        let index = self.advance()?;
        Materializer::new(&self.commands[index]).read_table(self.cursor.as_mut())
    }

    fn advance(&mut self) -> QuarryResult<usize> {
        let index = self
            .pending
            .pop_front()
            .ok_or_else(|| QuarryError::mapping("every result set has been read", Vec::new()))?;
        if self.started {
            let more = self
                .cursor
                .next_result_set()
                .map_err(|e| QuarryError::execution(self.commands[index].clone(), e))?;
            if !more {
                return Err(QuarryError::mapping(
                    format!("the cursor ended before the result of `{}`", self.commands[index].sql()),
                    Vec::new(),
                ));
            }
        }
        self.started = true;
        Ok(index)
    }
}

/// Convert a scalar, keeping the raw value on failure.
pub(crate) fn convert<V: FromValue>(value: Value) -> QuarryResult<V> {
    V::from_value(value.clone()).map_err(|e| QuarryError::mapping(e.to_string(), vec![value]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{field, Query};
    use crate::compile::{CompileOptions, ToCommand};
    use crate::exec::{BufferedCursor, ResultSet};
    use crate::sql::Dialect;
    use crate::test_fixtures::{registry, Customer};

    #[test]
    fn test_reads_sets_in_order() {
        let registry = registry();
        let options = CompileOptions::new(Dialect::Sqlite);
        let customers = Query::<Customer>::table_in(&registry)
            .filter(field("Active"))
            .to_command(options)
            .unwrap();
        let count = Query::<Customer>::table_in(&registry).count().to_command(options).unwrap();

        let cursor = BufferedCursor::new(
            vec![
                ResultSet::new(["Id", "Name", "City", "Active", "AddressId"]).with_row([
                    Value::Int(1),
                    Value::Text("Ann".into()),
                    Value::Null,
                    Value::Bool(true),
                    Value::Null,
                ]),
                ResultSet::new(["Value"]).with_row([Value::Int(4)]),
            ],
            0,
        );
        let mut reader = MultiReader::new(Box::new(cursor), vec![customers, count]);
        assert_eq!(reader.remaining(), 2);

        let list: Vec<Customer> = reader.read_list().unwrap();
        assert_eq!(list[0].name, "Ann");
        let total: i64 = reader.read_scalar().unwrap();
        assert_eq!(total, 4);
        assert!(reader.read_table().is_err());
    }

    #[test]
    fn test_scalar_conversion_keeps_value() {
        let err = convert::<i64>(Value::Text("x".into())).unwrap_err();
        assert_eq!(err.row(), Some(&[Value::Text("x".into())][..]));
    }
}
