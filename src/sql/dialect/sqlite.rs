//! SQLite SQL dialect.
//!
//! SQLite differences from ANSI:
//! - Named parameters with a colon (`:p0`)
//! - Booleans stored as integers
//! - `LIMIT -1` for offset-only paging
//! - Dates and times are text; date parts come from `strftime`
//! - `last_insert_rowid()` for identities

use super::helpers;
use super::{CastTarget, DatePart, SqlDialect};
use crate::sql::token::{Token, TokenStream};

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn parameter_marker(&self, ordinal: usize) -> String {
        format!(":p{}", ordinal)
    }

    fn datetime_precision(&self) -> u8 {
        3
    }

    fn emit_limit_offset(
        &self,
        limit: Option<&TokenStream>,
        offset: Option<&TokenStream>,
    ) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset, Some(Token::LitInt(-1)))
    }

    fn emit_date_part(&self, part: DatePart, arg: TokenStream) -> TokenStream {
        let format = match part {
            DatePart::Year => "%Y",
            DatePart::Month => "%m",
            DatePart::Day => "%d",
            DatePart::Hour => "%H",
            DatePart::Minute => "%M",
            DatePart::Second => "%S",
        };
        let mut ts = TokenStream::new();
        ts.push(Token::Cast)
            .lparen()
            .push(Token::FunctionName("strftime".into()))
            .lparen()
            .push(Token::LitString(format.into()))
            .comma()
            .space()
            .append(&arg)
            .rparen()
            .space()
            .push(Token::As)
            .space()
            .push(Token::Raw("INTEGER".into()))
            .rparen();
        ts
    }

    fn emit_add_days(&self, date: TokenStream, days: TokenStream) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::FunctionName("datetime".into()))
            .lparen()
            .append(&date)
            .comma()
            .space()
            .append(&days)
            .space()
            .push(Token::Concat)
            .space()
            .push(Token::LitString(" days".into()))
            .rparen();
        ts
    }

    fn emit_now(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::FunctionName("datetime".into()))
            .lparen()
            .push(Token::LitString("now".into()))
            .comma()
            .space()
            .push(Token::LitString("localtime".into()))
            .rparen();
        ts
    }

    fn cast_type_name(&self, target: CastTarget) -> &'static str {
        match target {
            CastTarget::Text => "TEXT",
            CastTarget::Int => "INTEGER",
            CastTarget::Float => "REAL",
        }
    }

    fn identity_trailer(&self) -> Option<TokenStream> {
        let mut ts = TokenStream::new();
        ts.push(Token::Select)
            .space()
            .push(Token::Raw("last_insert_rowid()".into()));
        Some(ts)
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_sqlite(name)
    }
}
