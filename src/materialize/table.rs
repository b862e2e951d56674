//! Untyped tabular results.

use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::value::Value;

/// Column names plus rows of values, in result order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl DataTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Ordinal of a column by name.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// The value at `row` in the named column.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let ordinal = self.column(column)?;
        self.rows.get(row)?.get(ordinal)
    }

    /// The rows as a JSON array of objects keyed by column name.
    pub fn to_json(&self) -> serde_json::Result<Json> {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let object = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(name, value)| Ok((name.clone(), serde_json::to_value(value)?)))
                    .collect::<serde_json::Result<Map<_, _>>>()?;
                Ok(Json::Object(object))
            })
            .collect::<serde_json::Result<Vec<_>>>()?;
        Ok(Json::Array(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_json() {
        let mut table = DataTable::new(vec!["Id".into(), "Name".into(), "Blob".into()]);
        table.push(vec![Value::Int(1), Value::Text("Ann".into()), Value::Bytes(vec![0xab, 0x01])]);
        table.push(vec![Value::Int(2), Value::Null, Value::Null]);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "Name"), Some(&Value::Text("Ann".into())));
        assert_eq!(
            table.to_json().unwrap(),
            json!([
                { "Id": 1, "Name": "Ann", "Blob": "ab01" },
                { "Id": 2, "Name": null, "Blob": null },
            ])
        );
    }
}
