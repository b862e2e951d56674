//! The token stream every statement is rendered through.
//!
//! Compilers emit [`Token`]s; only serialization consults the dialect, so one
//! compiled command can be re-rendered with shifted parameter ordinals.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use super::dialect::{Dialect, SqlDialect};

/// One element of a SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // === Keywords ===
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    As,
    On,
    Join,
    Inner,
    Left,
    Right,
    Cross,
    GroupBy,
    Having,
    OrderBy,
    Asc,
    Desc,
    Limit,
    Offset,
    Fetch,
    Next,
    Rows,
    Only,
    Top,
    Case,
    When,
    Then,
    Else,
    End,
    In,
    Like,
    Escape,
    IsNull,
    IsNotNull,
    Distinct,
    All,
    Union,
    Null,
    True,
    False,
    If,
    Exists,
    Cast,

    // === DML Keywords ===
    Insert,
    Into,
    Values,
    Update,
    Set,
    Delete,
    Returning,

    // === Punctuation ===
    Comma,
    Dot,
    Star,
    LParen,
    RParen,
    Semicolon,

    // === Operators ===
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Concat,

    // === Whitespace / Formatting ===
    Space,
    Newline,
    Indent(usize),

    // === Dynamic Content ===
    /// Simple identifier (table, column, alias)
    Ident(String),
    /// Qualified identifier: schema.table or just table
    QualifiedIdent {
        schema: Option<String>,
        name: String,
    },
    /// Bound parameter, rendered with the dialect's marker for its ordinal.
    Param(usize),
    /// Integer literal
    LitInt(i64),
    /// Float literal
    LitFloat(f64),
    /// String literal
    LitString(String),
    /// String literal that must keep its unicode marker (T-SQL `N'...'`)
    LitNString(String),
    /// Boolean literal
    LitBool(bool),
    /// NULL literal
    LitNull,
    /// Binary literal
    LitBytes(Vec<u8>),
    LitDate(NaiveDate),
    LitTime(NaiveTime),
    /// Timestamp literal, with the declared fractional-second precision if known
    LitDateTime(NaiveDateTime, Option<u8>),
    LitGuid(Uuid),

    // === Function Names ===
    /// Function name, remapped per dialect on output.
    FunctionName(String),

    // === Escape Hatch ===
    /// Raw SQL passed directly to output without escaping.
    ///
    /// # Security Warning
    ///
    /// **Never pass user input to this variant.** Only trusted, static
    /// dialect fragments (`DATEPART` units, type names) go here. Values
    /// always travel as `Param` or one of the `Lit*` tokens.
    Raw(String),
}

impl Token {
    /// Fixed text of keywords, punctuation and operators that read the same
    /// in every dialect.
    fn fixed(&self) -> Option<&'static str> {
        use Token::*;
        let text = match self {
            Select => "SELECT",
            From => "FROM",
            Where => "WHERE",
            And => "AND",
            Or => "OR",
            Not => "NOT",
            As => "AS",
            On => "ON",
            Join => "JOIN",
            Inner => "INNER",
            Left => "LEFT",
            Right => "RIGHT",
            Cross => "CROSS",
            GroupBy => "GROUP BY",
            Having => "HAVING",
            OrderBy => "ORDER BY",
            Asc => "ASC",
            Desc => "DESC",
            Limit => "LIMIT",
            Offset => "OFFSET",
            Fetch => "FETCH",
            Next => "NEXT",
            Rows => "ROWS",
            Only => "ONLY",
            Top => "TOP",
            Case => "CASE",
            When => "WHEN",
            Then => "THEN",
            Else => "ELSE",
            End => "END",
            In => "IN",
            Like => "LIKE",
            Escape => "ESCAPE",
            IsNull => "IS NULL",
            IsNotNull => "IS NOT NULL",
            Distinct => "DISTINCT",
            All => "ALL",
            Union => "UNION",
            Null | LitNull => "NULL",
            True => "TRUE",
            False => "FALSE",
            If => "IF",
            Exists => "EXISTS",
            Cast => "CAST",
            Insert => "INSERT",
            Into => "INTO",
            Values => "VALUES",
            Update => "UPDATE",
            Set => "SET",
            Delete => "DELETE",
            Returning => "RETURNING",
            Comma => ",",
            Dot => ".",
            Star | Mul => "*",
            LParen => "(",
            RParen => ")",
            Semicolon => ";",
            Eq => "=",
            Ne => "<>",
            Lt => "<",
            Gt => ">",
            Lte => "<=",
            Gte => ">=",
            Plus => "+",
            Minus => "-",
            Div => "/",
            Mod => "%",
            Space => " ",
            Newline => "\n",
            _ => return None,
        };
        Some(text)
    }

    /// Serialize this token to a string for the given dialect.
    pub fn serialize(&self, dialect: Dialect) -> String {
        self.serialize_with(dialect, 0)
    }

    /// Serialize with parameter ordinals shifted by `param_offset`.
    ///
    /// Used when several commands share one round trip.
    pub fn serialize_with(&self, dialect: Dialect, param_offset: usize) -> String {
        if let Some(text) = self.fixed() {
            return text.to_string();
        }
        match self {
            Token::Concat => dialect.concat_operator().to_string(),
            Token::Indent(n) => "  ".repeat(*n),
            Token::Ident(name) => dialect.quote_identifier(name),
            Token::QualifiedIdent {
                schema: Some(schema),
                name,
            } => format!(
                "{}.{}",
                dialect.quote_identifier(schema),
                dialect.quote_identifier(name)
            ),
            Token::QualifiedIdent { schema: None, name } => dialect.quote_identifier(name),
            Token::Param(ordinal) => dialect.parameter_marker(ordinal + param_offset),
            Token::LitInt(n) => n.to_string(),
            // The compiler rejects non-finite constants before they get here
            Token::LitFloat(f) if !f.is_finite() => "NULL".to_string(),
            Token::LitFloat(f) => ryu::Buffer::new().format_finite(*f).to_string(),
            Token::LitString(s) => dialect.quote_string(s),
            Token::LitNString(s) => dialect.quote_nstring(s),
            Token::LitBool(b) => dialect.format_bool(*b).to_string(),
            Token::LitBytes(bytes) => dialect.format_bytes(bytes),
            Token::LitDate(d) => dialect.format_date(d),
            Token::LitTime(t) => dialect.format_time(t, dialect.datetime_precision()),
            Token::LitDateTime(dt, precision) => {
                dialect.format_datetime(dt, precision.unwrap_or(dialect.datetime_precision()))
            }
            Token::LitGuid(g) => dialect.format_guid(g),
            Token::FunctionName(name) => dialect
                .remap_function(name)
                .unwrap_or(name.as_str())
                .to_uppercase(),
            Token::Raw(s) => s.clone(),
            _ => String::new(),
        }
    }
}

/// A stream of tokens that can be serialized to SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    /// Create an empty token stream.
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    /// Push a single token.
    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    /// Extend with multiple tokens.
    pub fn extend(&mut self, tokens: impl IntoIterator<Item = Token>) -> &mut Self {
        self.tokens.extend(tokens);
        self
    }

    /// Append another token stream.
    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Number of distinct parameter ordinals referenced by this stream.
    pub fn param_count(&self) -> usize {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Param(n) => Some(n + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Serialize all tokens to a SQL string.
    pub fn serialize(&self, dialect: Dialect) -> String {
        self.serialize_with(dialect, 0)
    }

    /// Serialize with parameter ordinals shifted by `param_offset`.
    pub fn serialize_with(&self, dialect: Dialect, param_offset: usize) -> String {
        self.tokens
            .iter()
            .map(|t| t.serialize_with(dialect, param_offset))
            .collect()
    }

    // Convenience methods for common tokens
    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn newline(&mut self) -> &mut Self {
        self.push(Token::Newline)
    }
    pub fn indent(&mut self, n: usize) -> &mut Self {
        self.push(Token::Indent(n))
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_serialize() {
        assert_eq!(Token::Select.serialize(Dialect::Sqlite), "SELECT");
        assert_eq!(Token::GroupBy.serialize(Dialect::TSql), "GROUP BY");
    }

    #[test]
    fn test_ident_serialize() {
        let tok = Token::Ident("users".into());
        assert_eq!(tok.serialize(Dialect::Sqlite), "\"users\"");
        assert_eq!(tok.serialize(Dialect::TSql), "[users]");
        assert_eq!(tok.serialize(Dialect::MySql), "`users`");
    }

    #[test]
    fn test_qualified_ident() {
        let tok = Token::QualifiedIdent {
            schema: Some("dbo".into()),
            name: "users".into(),
        };
        assert_eq!(tok.serialize(Dialect::TSql), "[dbo].[users]");
    }

    #[test]
    fn test_param_markers() {
        assert_eq!(Token::Param(0).serialize(Dialect::TSql), "@p0");
        assert_eq!(Token::Param(2).serialize(Dialect::Sqlite), ":p2");
        assert_eq!(Token::Param(0).serialize(Dialect::Postgres), "$1");
        assert_eq!(Token::Param(1).serialize_with(Dialect::TSql, 3), "@p4");
    }

    #[test]
    fn test_param_count() {
        let mut ts = TokenStream::new();
        ts.push(Token::Param(0)).push(Token::Param(2)).push(Token::Param(1));
        assert_eq!(ts.param_count(), 3);
        assert_eq!(TokenStream::new().param_count(), 0);
    }

    #[test]
    fn test_token_stream() {
        let mut ts = TokenStream::new();
        ts.push(Token::Select)
            .space()
            .push(Token::Ident("name".into()))
            .space()
            .push(Token::From)
            .space()
            .push(Token::Ident("users".into()));

        assert_eq!(
            ts.serialize(Dialect::Postgres),
            "SELECT \"name\" FROM \"users\""
        );
    }

    #[test]
    fn test_concat_dialect() {
        assert_eq!(Token::Concat.serialize(Dialect::Sqlite), "||");
        assert_eq!(Token::Concat.serialize(Dialect::TSql), "+");
    }

    #[test]
    fn test_datetime_precision_padding() {
        let dt = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_milli_opt(7, 8, 9, 123)
            .unwrap();
        assert_eq!(
            Token::LitDateTime(dt, None).serialize(Dialect::TSql),
            "'2024-05-06 07:08:09.1230000'"
        );
        assert_eq!(
            Token::LitDateTime(dt, Some(3)).serialize(Dialect::TSql),
            "'2024-05-06 07:08:09.123'"
        );
        assert_eq!(
            Token::LitDateTime(dt, None).serialize(Dialect::Sqlite),
            "'2024-05-06 07:08:09.123'"
        );
    }

    #[test]
    fn test_float_serialize() {
        assert_eq!(Token::LitFloat(3.14).serialize(Dialect::Sqlite), "3.14");
        assert_eq!(Token::LitFloat(1.0).serialize(Dialect::Sqlite), "1.0");
        assert_eq!(Token::LitFloat(-42.5).serialize(Dialect::Sqlite), "-42.5");
    }

    #[test]
    fn test_non_finite_float_is_null() {
        assert_eq!(Token::LitFloat(f64::NAN).serialize(Dialect::Sqlite), "NULL");
    }
}
