//! Test utilities for SQL emission validation.
//!
//! Provides helpers for validating that emitted SQL is syntactically correct
//! using sqlparser-rs for roundtrip validation.

use sqlparser::dialect::{MsSqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

use super::dialect::Dialect;

/// Validates that a SQL string is syntactically valid for the given dialect.
///
/// Uses sqlparser-rs to parse the SQL and returns an error if parsing fails.
/// Parameter markers are swapped for literals first, since not every parser
/// dialect accepts every marker style.
pub fn validate_sql(sql: &str, dialect: Dialect) -> Result<(), String> {
    let parser_dialect: Box<dyn sqlparser::dialect::Dialect> = match dialect {
        Dialect::Postgres => Box::new(PostgreSqlDialect {}),
        Dialect::MySql => Box::new(MySqlDialect {}),
        Dialect::TSql => Box::new(MsSqlDialect {}),
        Dialect::Sqlite => Box::new(SQLiteDialect {}),
    };

    let sql = strip_parameter_markers(sql);
    Parser::parse_sql(&*parser_dialect, &sql)
        .map(|_| ())
        .map_err(|e| format!("Invalid SQL for {:?}: {}\nSQL: {}", dialect, e, sql))
}

/// Replace `@p0`, `:p0` and `$1` markers with the literal `0`.
fn strip_parameter_markers(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        if c == '\'' {
            in_string = !in_string;
            out.push(c);
            continue;
        }
        let marker = !in_string
            && match c {
                '@' | ':' => chars.peek() == Some(&'p'),
                '$' => chars.peek().is_some_and(|n| n.is_ascii_digit()),
                _ => false,
            };
        if marker {
            if c != '$' {
                chars.next();
            }
            while chars.peek().is_some_and(|n| n.is_ascii_digit()) {
                chars.next();
            }
            out.push('0');
        } else {
            out.push(c);
        }
    }
    out
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_sql() {
        validate_sql("SELECT * FROM users", Dialect::Postgres).unwrap();
        validate_sql("SELECT * FROM users", Dialect::MySql).unwrap();
        validate_sql("SELECT * FROM users", Dialect::Sqlite).unwrap();
    }

    #[test]
    fn test_validate_invalid_sql() {
        let result = validate_sql("SELEC * FORM users", Dialect::Postgres);
        assert!(result.is_err());
    }

    #[test]
    fn test_markers_replaced() {
        assert_eq!(
            strip_parameter_markers("a = @p12 AND b = $3 AND c = ':p1'"),
            "a = 0 AND b = 0 AND c = ':p1'"
        );
    }
}
