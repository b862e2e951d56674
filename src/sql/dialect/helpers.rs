//! Shared helper functions for SQL dialect implementations.
//!
//! This module provides reusable building blocks that dialects can compose
//! to implement the `SqlDialect` trait with minimal duplication.

use chrono::{NaiveDateTime, NaiveTime, Timelike};

use super::super::token::{Token, TokenStream};

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, SQLite
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Quote identifier with square brackets.
/// Used by: T-SQL
pub fn quote_bracket(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quote string with N prefix for Unicode (T-SQL).
pub fn quote_string_unicode(s: &str) -> String {
    format!("N'{}'", s.replace('\'', "''"))
}

/// Quote string with single quotes, doubling backslashes too.
///
/// MySQL treats `\` as an escape inside string literals by default.
pub fn quote_string_backslash(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

/// Format boolean as literal true/false.
/// Used by: Postgres
pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Format boolean as numeric 1/0.
/// Used by: T-SQL, MySQL, SQLite
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

// =============================================================================
// Binary and temporal literals
// =============================================================================

/// `0xDEAD` (T-SQL)
pub fn format_bytes_0x(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "0x".into();
    }
    format!("0x{}", hex::encode_upper(bytes))
}

/// `X'DEAD'` (MySQL, SQLite)
pub fn format_bytes_x(bytes: &[u8]) -> String {
    format!("X'{}'", hex::encode_upper(bytes))
}

/// `'\xdead'::bytea` (Postgres)
pub fn format_bytes_bytea(bytes: &[u8]) -> String {
    format!("'\\x{}'::bytea", hex::encode(bytes))
}

/// Fractional seconds padded to `precision` digits.
///
/// Returns an empty string for precision 0.
pub fn format_fraction(nanos: u32, precision: u8) -> String {
    let precision = precision.min(9);
    if precision == 0 {
        return String::new();
    }
    // Leap-second nanos (>= 1e9) are clamped to the last representable instant.
    let nanos = nanos.min(999_999_999);
    let scaled = nanos / 10u32.pow(9 - precision as u32);
    format!(".{:0width$}", scaled, width = precision as usize)
}

/// `HH:MM:SS.fffffff` with the requested precision.
pub fn format_time_body(time: &NaiveTime, precision: u8) -> String {
    format!(
        "{}{}",
        time.format("%H:%M:%S"),
        format_fraction(time.nanosecond(), precision)
    )
}

/// `YYYY-MM-DD HH:MM:SS.fff` with the requested precision.
pub fn format_datetime_body(dt: &NaiveDateTime, precision: u8) -> String {
    format!(
        "{} {}",
        dt.date().format("%Y-%m-%d"),
        format_time_body(&dt.time(), precision)
    )
}

// =============================================================================
// Pagination
// =============================================================================

/// Emit LIMIT ... OFFSET ... (standard SQL).
///
/// `unbounded` is used as the limit when only an offset is present and the
/// dialect cannot express OFFSET on its own.
pub fn emit_limit_offset_standard(
    limit: Option<&TokenStream>,
    offset: Option<&TokenStream>,
    unbounded: Option<Token>,
) -> TokenStream {
    let mut ts = TokenStream::new();

    match (limit, unbounded) {
        (Some(lim), _) => {
            ts.push(Token::Limit).space().append(lim);
        }
        (None, Some(max)) if offset.is_some() => {
            ts.push(Token::Limit).space().push(max);
        }
        _ => {}
    }

    if let Some(off) = offset {
        if !ts.is_empty() {
            ts.space();
        }
        ts.push(Token::Offset).space().append(off);
    }

    ts
}

/// Emit OFFSET ... ROWS FETCH NEXT ... ROWS ONLY (T-SQL style).
/// Note: Requires ORDER BY clause in T-SQL
pub fn emit_limit_offset_tsql(
    limit: Option<&TokenStream>,
    offset: Option<&TokenStream>,
) -> TokenStream {
    let mut ts = TokenStream::new();

    ts.push(Token::Offset).space();
    match offset {
        Some(off) => ts.append(off),
        None => ts.push(Token::LitInt(0)),
    };
    ts.space().push(Token::Rows);

    if let Some(lim) = limit {
        ts.space()
            .push(Token::Fetch)
            .space()
            .push(Token::Next)
            .space()
            .append(lim)
            .space()
            .push(Token::Rows)
            .space()
            .push(Token::Only);
    }

    ts
}

// =============================================================================
// Function Remapping
// =============================================================================

/// Remap functions for Postgres dialect.
pub fn remap_function_postgres(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "NVL" => Some("COALESCE"),
        "IFNULL" => Some("COALESCE"),
        "ISNULL" => Some("COALESCE"),
        "SUBSTR" => Some("SUBSTRING"),
        "NOW" => Some("LOCALTIMESTAMP"),
        _ => None,
    }
}

/// Remap functions for MySQL dialect.
pub fn remap_function_mysql(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "NVL" => Some("IFNULL"),
        "ISNULL" => Some("IFNULL"),
        "SUBSTR" => Some("SUBSTRING"),
        "LENGTH" => Some("CHAR_LENGTH"),
        _ => None,
    }
}

/// Remap functions for T-SQL dialect.
pub fn remap_function_tsql(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "LENGTH" => Some("LEN"),
        "SUBSTR" => Some("SUBSTRING"),
        "NOW" => Some("GETDATE"),
        "CURRENT_TIMESTAMP" => Some("GETDATE"),
        "NVL" => Some("ISNULL"),
        "IFNULL" => Some("ISNULL"),
        _ => None,
    }
}

/// Remap functions for SQLite dialect.
pub fn remap_function_sqlite(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "SUBSTRING" => Some("SUBSTR"),
        "NVL" => Some("IFNULL"),
        "ISNULL" => Some("IFNULL"),
        _ => None,
    }
}
