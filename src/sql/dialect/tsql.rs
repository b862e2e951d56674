//! T-SQL (SQL Server / Azure SQL) dialect.
//!
//! T-SQL has significant differences from ANSI:
//! - Square bracket identifier quoting (`[name]`)
//! - No native boolean in SELECT (must use CASE)
//! - OFFSET FETCH for pagination (requires ORDER BY)
//! - TOP for simple limiting
//! - N'...' prefix for Unicode strings
//! - `0x` binary literals
//! - `SCOPE_IDENTITY()` instead of RETURNING
//! - String concatenation with `+`

use super::helpers;
use super::{CastTarget, DatePart, MutationStyle, SqlDialect};
use crate::sql::token::{Token, TokenStream};

/// T-SQL (SQL Server) dialect.
#[derive(Debug, Clone, Copy)]
pub struct TSql;

impl SqlDialect for TSql {
    fn name(&self) -> &'static str {
        "tsql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_bracket(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        // Non-ASCII text would be mangled by the code page without N.
        if !s.is_ascii() {
            helpers::quote_string_unicode(s)
        } else {
            helpers::quote_string_single(s)
        }
    }

    fn quote_nstring(&self, s: &str) -> String {
        helpers::quote_string_unicode(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn format_bytes(&self, bytes: &[u8]) -> String {
        helpers::format_bytes_0x(bytes)
    }

    fn datetime_precision(&self) -> u8 {
        // datetime2(7)
        7
    }

    fn emit_limit_offset(
        &self,
        limit: Option<&TokenStream>,
        offset: Option<&TokenStream>,
    ) -> TokenStream {
        helpers::emit_limit_offset_tsql(limit, offset)
    }

    fn supports_top(&self) -> bool {
        true
    }

    fn requires_order_by_for_offset(&self) -> bool {
        true
    }

    fn concat_operator(&self) -> &'static str {
        "+"
    }

    fn supports_boolean_expressions(&self) -> bool {
        false
    }

    fn emit_date_part(&self, part: DatePart, arg: TokenStream) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::FunctionName("DATEPART".into()))
            .lparen()
            .push(Token::Raw(part.keyword().to_lowercase()))
            .comma()
            .space()
            .append(&arg)
            .rparen();
        ts
    }

    fn emit_add_days(&self, date: TokenStream, days: TokenStream) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::FunctionName("DATEADD".into()))
            .lparen()
            .push(Token::Raw("day".into()))
            .comma()
            .space()
            .append(&days)
            .comma()
            .space()
            .append(&date)
            .rparen();
        ts
    }

    fn emit_now(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::FunctionName("GETDATE".into())).lparen().rparen();
        ts
    }

    fn cast_type_name(&self, target: CastTarget) -> &'static str {
        match target {
            CastTarget::Text => "NVARCHAR(MAX)",
            CastTarget::Int => "BIGINT",
            CastTarget::Float => "FLOAT",
        }
    }

    fn emit_exists_check(&self, inner: &TokenStream) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::If)
            .space()
            .push(Token::Exists)
            .lparen()
            .newline()
            .append(inner)
            .newline()
            .rparen()
            .newline()
            .push(Token::Select)
            .space()
            .push(Token::LitInt(1))
            .newline()
            .push(Token::Else)
            .newline()
            .push(Token::Select)
            .space()
            .push(Token::LitInt(0));
        ts
    }

    fn identity_trailer(&self) -> Option<TokenStream> {
        let mut ts = TokenStream::new();
        ts.push(Token::Select)
            .space()
            .push(Token::Raw("CAST(SCOPE_IDENTITY() AS BIGINT)".into()));
        Some(ts)
    }

    fn mutation_style(&self) -> MutationStyle {
        MutationStyle::JoinedFrom
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_tsql(name)
    }
}
