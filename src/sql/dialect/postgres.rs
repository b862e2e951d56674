//! PostgreSQL SQL dialect.
//!
//! PostgreSQL features:
//! - ANSI identifier quoting (`"`)
//! - Positional parameters (`$1`)
//! - Native boolean type (true/false)
//! - RETURNING clause
//! - `bytea` hex literals
//! - `~` regular expression match

use super::helpers;
use super::{CastTarget, DatePart, SqlDialect};
use crate::sql::token::{Token, TokenStream};

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn parameter_marker(&self, ordinal: usize) -> String {
        format!("${}", ordinal + 1)
    }

    fn format_bytes(&self, bytes: &[u8]) -> String {
        helpers::format_bytes_bytea(bytes)
    }

    // Uses default emit_limit_offset (LIMIT ... OFFSET ...)

    fn emit_regex_match(&self, subject: TokenStream, pattern: TokenStream) -> Option<TokenStream> {
        let mut ts = TokenStream::new();
        ts.append(&subject)
            .space()
            .push(Token::Raw("~".into()))
            .space()
            .append(&pattern);
        Some(ts)
    }

    fn emit_date_part(&self, part: DatePart, arg: TokenStream) -> TokenStream {
        // EXTRACT yields numeric; callers compare against integers.
        let mut ts = TokenStream::new();
        ts.push(Token::Cast)
            .lparen()
            .push(Token::FunctionName("EXTRACT".into()))
            .lparen()
            .push(Token::Raw(part.keyword().into()))
            .space()
            .push(Token::From)
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
        ts.lparen()
            .append(&date)
            .space()
            .push(Token::Plus)
            .space()
            .lparen()
            .append(&days)
            .rparen()
            .space()
            .push(Token::Mul)
            .space()
            .push(Token::Raw("INTERVAL '1 day'".into()))
            .rparen();
        ts
    }

    fn emit_now(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Raw("LOCALTIMESTAMP".into()));
        ts
    }

    fn cast_type_name(&self, target: CastTarget) -> &'static str {
        match target {
            CastTarget::Text => "TEXT",
            CastTarget::Int => "BIGINT",
            CastTarget::Float => "DOUBLE PRECISION",
        }
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn identity_trailer(&self) -> Option<TokenStream> {
        None
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_postgres(name)
    }
}
