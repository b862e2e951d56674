//! SQL Dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction for SQL dialect differences.
//! Each dialect implements `SqlDialect` to handle its specific syntax:
//!
//! - Identifier quoting: `"` (PostgreSQL/SQLite), `` ` `` (MySQL), `[]` (T-SQL)
//! - Parameter markers: `@p0` (T-SQL/MySQL), `$1` (PostgreSQL), `:p0` (SQLite)
//! - Pagination: LIMIT/OFFSET vs OFFSET FETCH vs TOP
//! - Boolean literals: true/false vs 1/0
//! - Binary and temporal literal encoding
//! - How a mutation over a query source is expressed
//!
//! # Usage
//!
//! ```ignore
//! use quarry::sql::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! let quoted = dialect.quote_identifier("user");  // "user"
//! ```
//!
//! | Feature | T-SQL | MySQL | PostgreSQL | SQLite |
//! |---------|-------|-------|------------|--------|
//! | Boolean expressions in SELECT | ❌ | ✓ | ✓ | ✓ |
//! | Identity read-back | `SCOPE_IDENTITY()` | `LAST_INSERT_ID()` | `RETURNING` | `last_insert_rowid()` |
//! | Regular expressions | ❌ | `REGEXP` | `~` | ❌ |
//! | Joined UPDATE/DELETE | `FROM` | multi-table | correlated | correlated |

mod helpers;
mod mysql;
mod postgres;
mod sqlite;
mod tsql;

pub use mysql::MySql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;
pub use tsql::TSql;

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use super::token::{Token, TokenStream};

/// Parts of a date or timestamp that can be extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl DatePart {
    pub fn keyword(&self) -> &'static str {
        match self {
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::Day => "DAY",
            DatePart::Hour => "HOUR",
            DatePart::Minute => "MINUTE",
            DatePart::Second => "SECOND",
        }
    }
}

/// Target types for scalar conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastTarget {
    Text,
    Int,
    Float,
}

/// How UPDATE/DELETE statements over a joined or paged source are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStyle {
    /// `UPDATE [t0] SET .. FROM [T] AS [t0] JOIN ..` (T-SQL)
    JoinedFrom,
    /// `UPDATE T AS t0 JOIN .. SET ..` (MySQL)
    JoinedTarget,
    /// `UPDATE T SET .. WHERE EXISTS (SELECT 1 FROM .. WHERE key = T.key)`
    Correlated,
}

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// Implementations handle dialect-specific syntax differences.
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    ///
    /// All dialects use single quotes with `''` for escaping.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Quote a string literal destined for a unicode column.
    fn quote_nstring(&self, s: &str) -> String {
        self.quote_string(s)
    }

    /// Format a boolean literal.
    ///
    /// - PostgreSQL: `true`/`false`
    /// - MySQL/T-SQL/SQLite: `1`/`0`
    fn format_bool(&self, b: bool) -> &'static str;

    /// Marker for the bound parameter with the given zero-based ordinal.
    fn parameter_marker(&self, ordinal: usize) -> String {
        format!("@p{}", ordinal)
    }

    /// Format a binary literal.
    fn format_bytes(&self, bytes: &[u8]) -> String {
        helpers::format_bytes_x(bytes)
    }

    fn format_date(&self, date: &NaiveDate) -> String {
        format!("'{}'", date.format("%Y-%m-%d"))
    }

    fn format_time(&self, time: &NaiveTime, precision: u8) -> String {
        format!("'{}'", helpers::format_time_body(time, precision))
    }

    /// Format a timestamp, padding fractional seconds to `precision` digits.
    fn format_datetime(&self, dt: &NaiveDateTime, precision: u8) -> String {
        format!("'{}'", helpers::format_datetime_body(dt, precision))
    }

    /// Fractional-second digits used when a column declares no scale.
    fn datetime_precision(&self) -> u8 {
        6
    }

    fn format_guid(&self, guid: &Uuid) -> String {
        format!("'{}'", guid.hyphenated())
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit LIMIT/OFFSET or equivalent pagination clause.
    ///
    /// The counts arrive as token streams since they may be bound parameters.
    fn emit_limit_offset(
        &self,
        limit: Option<&TokenStream>,
        offset: Option<&TokenStream>,
    ) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset, None)
    }

    /// Whether a take-only query is written as `SELECT TOP (n)`.
    fn supports_top(&self) -> bool {
        false
    }

    /// Whether this dialect requires ORDER BY for OFFSET/LIMIT.
    fn requires_order_by_for_offset(&self) -> bool {
        false
    }

    // =========================================================================
    // Operators
    // =========================================================================

    /// String concatenation operator.
    fn concat_operator(&self) -> &'static str {
        "||"
    }

    /// Whether this dialect supports the concat operator at all.
    ///
    /// MySQL uses `||` as logical OR by default.
    fn supports_concat_operator(&self) -> bool {
        true
    }

    /// Whether a predicate can appear where a value is expected.
    ///
    /// T-SQL has no boolean expression type, so `SELECT a = b` must become
    /// a `CASE` expression.
    fn supports_boolean_expressions(&self) -> bool {
        true
    }

    /// Regular expression match, or `None` when the dialect has none.
    fn emit_regex_match(&self, subject: TokenStream, pattern: TokenStream) -> Option<TokenStream> {
        let _ = (subject, pattern);
        None
    }

    // =========================================================================
    // Date/Time and conversions
    // =========================================================================

    /// Extract a date part as an integer.
    fn emit_date_part(&self, part: DatePart, arg: TokenStream) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::FunctionName(part.keyword().into()))
            .lparen()
            .append(&arg)
            .rparen();
        ts
    }

    /// Add a number of days to a date or timestamp.
    fn emit_add_days(&self, date: TokenStream, days: TokenStream) -> TokenStream;

    /// Current local timestamp.
    fn emit_now(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Raw("CURRENT_TIMESTAMP".into()));
        ts
    }

    /// Type name used in `CAST(x AS ..)`.
    fn cast_type_name(&self, target: CastTarget) -> &'static str;

    // =========================================================================
    // Statements
    // =========================================================================

    /// Wrap a select in an existence check yielding a single 1/0 row.
    fn emit_exists_check(&self, inner: &TokenStream) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Select)
            .space()
            .push(Token::Case)
            .space()
            .push(Token::When)
            .space()
            .push(Token::Exists)
            .lparen()
            .newline()
            .append(inner)
            .newline()
            .rparen()
            .space()
            .push(Token::Then)
            .space()
            .push(Token::LitInt(1))
            .space()
            .push(Token::Else)
            .space()
            .push(Token::LitInt(0))
            .space()
            .push(Token::End);
        ts
    }

    /// Whether this dialect supports RETURNING clause.
    fn supports_returning(&self) -> bool {
        false
    }

    /// Statement that reads back the identity generated by the last insert.
    ///
    /// `None` for dialects that use RETURNING instead.
    fn identity_trailer(&self) -> Option<TokenStream>;

    /// Suffix for an insert with no explicit columns.
    fn emit_default_values(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Raw("DEFAULT".into()))
            .space()
            .push(Token::Values);
        ts
    }

    fn mutation_style(&self) -> MutationStyle {
        MutationStyle::Correlated
    }

    // =========================================================================
    // Function Remapping
    // =========================================================================

    /// Remap a function name for this dialect.
    ///
    /// Returns `Some(new_name)` if the function should be remapped, `None` to
    /// keep the original. The input is matched case-insensitively.
    fn remap_function(&self, name: &str) -> Option<&'static str> {
        let _ = name;
        None
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Dialect {
    #[default]
    TSql,
    MySql,
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::TSql => &TSql,
            Dialect::MySql => &MySql,
            Dialect::Postgres => &Postgres,
            Dialect::Sqlite => &Sqlite,
        }
    }

    pub const ALL: [Dialect; 4] = [
        Dialect::TSql,
        Dialect::MySql,
        Dialect::Postgres,
        Dialect::Sqlite,
    ];
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tsql" | "mssql" | "sqlserver" => Ok(Dialect::TSql),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            other => Err(other.to_string()),
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn quote_nstring(&self, s: &str) -> String {
        self.dialect().quote_nstring(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn parameter_marker(&self, ordinal: usize) -> String {
        self.dialect().parameter_marker(ordinal)
    }

    fn format_bytes(&self, bytes: &[u8]) -> String {
        self.dialect().format_bytes(bytes)
    }

    fn format_date(&self, date: &NaiveDate) -> String {
        self.dialect().format_date(date)
    }

    fn format_time(&self, time: &NaiveTime, precision: u8) -> String {
        self.dialect().format_time(time, precision)
    }

    fn format_datetime(&self, dt: &NaiveDateTime, precision: u8) -> String {
        self.dialect().format_datetime(dt, precision)
    }

    fn datetime_precision(&self) -> u8 {
        self.dialect().datetime_precision()
    }

    fn format_guid(&self, guid: &Uuid) -> String {
        self.dialect().format_guid(guid)
    }

    fn emit_limit_offset(
        &self,
        limit: Option<&TokenStream>,
        offset: Option<&TokenStream>,
    ) -> TokenStream {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn supports_top(&self) -> bool {
        self.dialect().supports_top()
    }

    fn requires_order_by_for_offset(&self) -> bool {
        self.dialect().requires_order_by_for_offset()
    }

    fn concat_operator(&self) -> &'static str {
        self.dialect().concat_operator()
    }

    fn supports_concat_operator(&self) -> bool {
        self.dialect().supports_concat_operator()
    }

    fn supports_boolean_expressions(&self) -> bool {
        self.dialect().supports_boolean_expressions()
    }

    fn emit_regex_match(&self, subject: TokenStream, pattern: TokenStream) -> Option<TokenStream> {
        self.dialect().emit_regex_match(subject, pattern)
    }

    fn emit_date_part(&self, part: DatePart, arg: TokenStream) -> TokenStream {
        self.dialect().emit_date_part(part, arg)
    }

    fn emit_add_days(&self, date: TokenStream, days: TokenStream) -> TokenStream {
        self.dialect().emit_add_days(date, days)
    }

    fn emit_now(&self) -> TokenStream {
        self.dialect().emit_now()
    }

    fn cast_type_name(&self, target: CastTarget) -> &'static str {
        self.dialect().cast_type_name(target)
    }

    fn emit_exists_check(&self, inner: &TokenStream) -> TokenStream {
        self.dialect().emit_exists_check(inner)
    }

    fn supports_returning(&self) -> bool {
        self.dialect().supports_returning()
    }

    fn identity_trailer(&self) -> Option<TokenStream> {
        self.dialect().identity_trailer()
    }

    fn emit_default_values(&self) -> TokenStream {
        self.dialect().emit_default_values()
    }

    fn mutation_style(&self) -> MutationStyle {
        self.dialect().mutation_style()
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        self.dialect().remap_function(name)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}
