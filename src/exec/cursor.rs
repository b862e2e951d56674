//! In-memory cursors.

use serde::Serialize;

use crate::value::Value;

use super::provider::{Cursor, ProviderError, ProviderResult};

/// One buffered result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        self.rows.push(row.into_iter().map(Into::into).collect());
        self
    }
}

/// A cursor over result sets already held in memory.
#[derive(Debug, Clone, Default)]
pub struct BufferedCursor {
    sets: Vec<ResultSet>,
    set: usize,
    row: Option<usize>,
    affected: u64,
}

impl BufferedCursor {
    pub fn new(sets: Vec<ResultSet>, affected: u64) -> Self {
        Self {
            sets,
            set: 0,
            row: None,
            affected,
        }
    }

    /// A cursor with one result set.
    pub fn single(set: ResultSet) -> Self {
        Self::new(vec![set], 0)
    }

    /// Number of result sets held.
    pub fn result_set_count(&self) -> usize {
        self.sets.len()
    }

    fn current(&self) -> Option<&ResultSet> {
        self.sets.get(self.set)
    }
}

impl Cursor for BufferedCursor {
    fn columns(&self) -> &[String] {
        self.current()
            .map(|s| s.columns.as_slice())
            .unwrap_or_default()
    }

    fn next_row(&mut self) -> ProviderResult<bool> {
        let Some(set) = self.sets.get(self.set) else {
            return Ok(false);
        };
        let next = self.row.map_or(0, |r| r + 1);
        if next < set.rows.len() {
            self.row = Some(next);
            Ok(true)
        } else {
            self.row = Some(set.rows.len());
            Ok(false)
        }
    }

    fn get(&self, ordinal: usize) -> ProviderResult<Value> {
        let row = self
            .current()
            .zip(self.row)
            .and_then(|(set, row)| set.rows.get(row))
            .ok_or_else(|| ProviderError::new("the cursor is not positioned on a row"))?;
        row.get(ordinal)
            .cloned()
            .ok_or_else(|| ProviderError::new(format!("no column at ordinal {ordinal}")))
    }

    fn next_result_set(&mut self) -> ProviderResult<bool> {
        if self.set < self.sets.len() {
            self.set += 1;
        }
        self.row = None;
        Ok(self.set < self.sets.len())
    }

    fn records_affected(&self) -> u64 {
        self.affected
    }
}

/// The cursors of several round trips read as one.
pub(crate) struct CursorChain {
    current: Option<Box<dyn Cursor>>,
    /// Remaining cursors, last first.
    rest: Vec<Box<dyn Cursor>>,
    affected: u64,
}

impl CursorChain {
    /// Chain cursors in order. Each cursor comes with the number of result
    /// sets its round trip yields; cursors without any are skipped.
    pub fn new(parts: Vec<(Box<dyn Cursor>, usize)>) -> Self {
        let affected = parts.iter().map(|(c, _)| c.records_affected()).sum();
        let mut rest: Vec<_> = parts
            .into_iter()
            .filter(|(_, sets)| *sets > 0)
            .map(|(c, _)| c)
            .collect();
        rest.reverse();
        let current = rest.pop();
        Self {
            current,
            rest,
            affected,
        }
    }
}

impl Cursor for CursorChain {
    fn columns(&self) -> &[String] {
        self.current.as_ref().map(|c| c.columns()).unwrap_or_default()
    }

    fn next_row(&mut self) -> ProviderResult<bool> {
        match self.current.as_mut() {
            Some(cursor) => cursor.next_row(),
            None => Ok(false),
        }
    }

    fn get(&self, ordinal: usize) -> ProviderResult<Value> {
        match self.current.as_ref() {
            Some(cursor) => cursor.get(ordinal),
            None => Err(ProviderError::new("the cursor has no result set")),
        }
    }

    fn next_result_set(&mut self) -> ProviderResult<bool> {
        if let Some(cursor) = self.current.as_mut() {
            if cursor.next_result_set()? {
                return Ok(true);
            }
        }
        self.current = self.rest.pop();
        Ok(self.current.is_some())
    }

    fn records_affected(&self) -> u64 {
        self.affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(name: &str, values: &[i64]) -> ResultSet {
        values
            .iter()
            .fold(ResultSet::new([name]), |set, v| set.with_row([*v]))
    }

    #[test]
    fn test_buffered_cursor_walks_sets() {
        let mut cursor = BufferedCursor::new(vec![set("a", &[1, 2]), set("b", &[3])], 4);
        assert_eq!(cursor.columns(), ["a"]);
        assert!(cursor.get(0).is_err());
        assert!(cursor.next_row().unwrap());
        assert_eq!(cursor.get(0).unwrap(), Value::Int(1));
        assert!(cursor.next_row().unwrap());
        assert!(!cursor.next_row().unwrap());
        assert!(cursor.next_result_set().unwrap());
        assert_eq!(cursor.columns(), ["b"]);
        assert!(cursor.next_row().unwrap());
        assert_eq!(cursor.get(0).unwrap(), Value::Int(3));
        assert!(cursor.get(1).is_err());
        assert!(!cursor.next_result_set().unwrap());
        assert!(!cursor.next_row().unwrap());
        assert_eq!(cursor.records_affected(), 4);
    }

    #[test]
    fn test_chain_skips_cursors_without_sets() {
        let first: Box<dyn Cursor> = Box::new(BufferedCursor::new(vec![set("a", &[1])], 0));
        let empty: Box<dyn Cursor> = Box::new(BufferedCursor::new(Vec::new(), 2));
        let last: Box<dyn Cursor> = Box::new(BufferedCursor::new(vec![set("c", &[9])], 1));
        let mut chain = CursorChain::new(vec![(first, 1), (empty, 0), (last, 1)]);

        assert_eq!(chain.records_affected(), 3);
        assert!(chain.next_row().unwrap());
        assert_eq!(chain.get(0).unwrap(), Value::Int(1));
        assert!(chain.next_result_set().unwrap());
        assert_eq!(chain.columns(), ["c"]);
        assert!(chain.next_row().unwrap());
        assert_eq!(chain.get(0).unwrap(), Value::Int(9));
        assert!(!chain.next_result_set().unwrap());
    }
}
