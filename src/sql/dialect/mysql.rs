//! MySQL SQL dialect.
//!
//! MySQL differences from ANSI:
//! - Backtick identifier quoting (`` `name` ``)
//! - Boolean is TINYINT(1), returns 1/0
//! - `||` is logical OR by default (use CONCAT())
//! - LIMIT ... OFFSET ... for pagination, no OFFSET without LIMIT
//! - No RETURNING clause (use LAST_INSERT_ID())
//! - Multi-table UPDATE/DELETE

use super::helpers;
use super::{CastTarget, MutationStyle, SqlDialect};
use crate::sql::token::{Token, TokenStream};

/// Largest row count MySQL accepts, used for offset-only paging.
const MAX_ROWS: &str = "18446744073709551615";

/// MySQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_backslash(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn emit_limit_offset(
        &self,
        limit: Option<&TokenStream>,
        offset: Option<&TokenStream>,
    ) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset, Some(Token::Raw(MAX_ROWS.into())))
    }

    fn concat_operator(&self) -> &'static str {
        // Callers should check supports_concat_operator()
        "||"
    }

    fn supports_concat_operator(&self) -> bool {
        false
    }

    fn emit_regex_match(&self, subject: TokenStream, pattern: TokenStream) -> Option<TokenStream> {
        let mut ts = TokenStream::new();
        ts.append(&subject)
            .space()
            .push(Token::Raw("REGEXP".into()))
            .space()
            .append(&pattern);
        Some(ts)
    }

    fn emit_add_days(&self, date: TokenStream, days: TokenStream) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::FunctionName("DATE_ADD".into()))
            .lparen()
            .append(&date)
            .comma()
            .space()
            .push(Token::Raw("INTERVAL".into()))
            .space()
            .append(&days)
            .space()
            .push(Token::Raw("DAY".into()))
            .rparen();
        ts
    }

    fn emit_now(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::FunctionName("NOW".into())).lparen().rparen();
        ts
    }

    fn cast_type_name(&self, target: CastTarget) -> &'static str {
        match target {
            CastTarget::Text => "CHAR",
            CastTarget::Int => "SIGNED",
            CastTarget::Float => "DOUBLE",
        }
    }

    fn identity_trailer(&self) -> Option<TokenStream> {
        let mut ts = TokenStream::new();
        ts.push(Token::Select)
            .space()
            .push(Token::Raw("LAST_INSERT_ID()".into()));
        Some(ts)
    }

    fn emit_default_values(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.lparen().rparen().space().push(Token::Values).space().lparen().rparen();
        ts
    }

    fn mutation_style(&self) -> MutationStyle {
        MutationStyle::JoinedTarget
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_mysql(name)
    }
}
