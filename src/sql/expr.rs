//! Expression AST - the core of SQL expression building.
//!
//! This module provides a strongly-typed AST for SQL expressions
//! with exhaustive pattern matching enforced by the compiler.
//! Precedence is the caller's business: sub-expressions are emitted
//! as given, and `Paren` is inserted where grouping must be explicit.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use super::dialect::{Dialect, SqlDialect};
use super::query::Query;
use super::token::{Token, TokenStream};

// =============================================================================
// Expression AST
// =============================================================================

/// A SQL expression.
///
/// Every variant must be handled in `to_tokens_for_dialect()` - the compiler
/// enforces this.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference: optional_table.column
    Column {
        table: Option<String>,
        column: String,
    },

    /// Literal values
    Literal(Literal),

    /// Bound parameter by ordinal
    Param(usize),

    /// Binary operation: left op right
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    /// Unary operation: op expr
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },

    /// Function call: name(args...)
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },

    /// CASE WHEN... THEN... ELSE... END
    Case {
        operand: Option<Box<Expr>>,
        when_clauses: Vec<(Expr, Expr)>,
        else_clause: Option<Box<Expr>>,
    },

    /// EXISTS (SELECT ...)
    Exists(Box<Query>),

    /// IN: expr IN (values...)
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// LIKE with ESCAPE: expr LIKE pattern ESCAPE escape_char
    LikeEscape {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        escape_char: char,
        negated: bool,
    },

    /// CAST(expr AS type)
    Cast {
        expr: Box<Expr>,
        type_name: &'static str,
    },

    /// `*`, only as the argument of `COUNT(*)`
    Star,

    /// Parenthesized expression
    Paren(Box<Expr>),

    /// Pre-rendered dialect fragment (date parts, regex matches).
    Fragment(TokenStream),

    /// Raw SQL expression passed directly to output without escaping.
    ///
    /// # Security Warning
    ///
    /// **Never pass user input to this variant.** Raw SQL is not sanitized.
    /// Values always go through `Literal` or `Param`.
    Raw(String),
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    /// Text bound for a unicode column (`N'..'` on T-SQL)
    NString(String),
    Bool(bool),
    Null,
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Timestamp with the column's declared fractional precision, if any
    DateTime(NaiveDateTime, Option<u8>),
    Guid(Uuid),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    // String
    Concat,
    Like,
}

impl BinaryOperator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Gt | Self::Lte | Self::Gte | Self::Like
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
}

impl Expr {
    /// Convert this expression to a token stream for a specific dialect.
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        match self {
            Expr::Column { table, column } => {
                if let Some(t) = table {
                    ts.push(Token::Ident(t.clone()));
                    ts.push(Token::Dot);
                }
                ts.push(Token::Ident(column.clone()));
            }

            Expr::Literal(lit) => {
                ts.push(match lit {
                    Literal::Int(n) => Token::LitInt(*n),
                    Literal::Float(f) => Token::LitFloat(*f),
                    Literal::String(s) => Token::LitString(s.clone()),
                    Literal::NString(s) => Token::LitNString(s.clone()),
                    Literal::Bool(b) => Token::LitBool(*b),
                    Literal::Null => Token::LitNull,
                    Literal::Bytes(b) => Token::LitBytes(b.clone()),
                    Literal::Date(d) => Token::LitDate(*d),
                    Literal::Time(t) => Token::LitTime(*t),
                    Literal::DateTime(dt, p) => Token::LitDateTime(*dt, *p),
                    Literal::Guid(g) => Token::LitGuid(*g),
                });
            }

            Expr::Param(ordinal) => {
                ts.push(Token::Param(*ordinal));
            }

            Expr::BinaryOp { left, op, right } => {
                // Handle CONCAT specially for dialects that don't support || operator
                if *op == BinaryOperator::Concat && !dialect.supports_concat_operator() {
                    ts.push(Token::FunctionName("CONCAT".into()));
                    ts.lparen();
                    ts.append(&left.to_tokens_for_dialect(dialect));
                    ts.comma().space();
                    ts.append(&right.to_tokens_for_dialect(dialect));
                    ts.rparen();
                } else {
                    ts.append(&left.to_tokens_for_dialect(dialect));
                    ts.space();
                    ts.push(binary_op_to_token(*op));
                    ts.space();
                    ts.append(&right.to_tokens_for_dialect(dialect));
                }
            }

            Expr::UnaryOp { op, expr } => {
                match op {
                    UnaryOperator::Not => ts.push(Token::Not).space(),
                    UnaryOperator::Minus => ts.push(Token::Minus),
                };
                ts.append(&expr.to_tokens_for_dialect(dialect));
            }

            Expr::Function {
                name,
                args,
                distinct,
            } => {
                ts.push(Token::FunctionName(name.clone()));
                ts.lparen();
                if *distinct {
                    ts.push(Token::Distinct).space();
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    ts.append(&arg.to_tokens_for_dialect(dialect));
                }
                ts.rparen();
            }

            Expr::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                ts.push(Token::Case);
                if let Some(op) = operand {
                    ts.space().append(&op.to_tokens_for_dialect(dialect));
                }
                for (when, then) in when_clauses {
                    ts.space().push(Token::When).space();
                    ts.append(&when.to_tokens_for_dialect(dialect));
                    ts.space().push(Token::Then).space();
                    ts.append(&then.to_tokens_for_dialect(dialect));
                }
                if let Some(else_expr) = else_clause {
                    ts.space().push(Token::Else).space();
                    ts.append(&else_expr.to_tokens_for_dialect(dialect));
                }
                ts.space().push(Token::End);
            }

            Expr::Exists(query) => {
                ts.push(Token::Exists).space().lparen();
                ts.append(&query.to_tokens_for_dialect(dialect));
                ts.rparen();
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                // "x IN ()" is invalid SQL; an empty list matches nothing.
                if values.is_empty() {
                    ts.push(Token::LitInt(1))
                        .space()
                        .push(if *negated { Token::Eq } else { Token::Ne })
                        .space()
                        .push(Token::LitInt(1));
                } else {
                    ts.append(&expr.to_tokens_for_dialect(dialect));
                    if *negated {
                        ts.space().push(Token::Not);
                    }
                    ts.space().push(Token::In).space().lparen();
                    for (i, val) in values.iter().enumerate() {
                        if i > 0 {
                            ts.comma().space();
                        }
                        ts.append(&val.to_tokens_for_dialect(dialect));
                    }
                    ts.rparen();
                }
            }

            Expr::IsNull { expr, negated } => {
                ts.append(&expr.to_tokens_for_dialect(dialect));
                ts.space();
                ts.push(if *negated {
                    Token::IsNotNull
                } else {
                    Token::IsNull
                });
            }

            Expr::LikeEscape {
                expr,
                pattern,
                escape_char,
                negated,
            } => {
                ts.append(&expr.to_tokens_for_dialect(dialect));
                if *negated {
                    ts.space().push(Token::Not);
                }
                ts.space()
                    .push(Token::Like)
                    .space()
                    .append(&pattern.to_tokens_for_dialect(dialect))
                    .space()
                    .push(Token::Escape)
                    .space()
                    .push(Token::LitString(escape_char.to_string()));
            }

            Expr::Cast { expr, type_name } => {
                ts.push(Token::Cast).lparen();
                ts.append(&expr.to_tokens_for_dialect(dialect));
                ts.space()
                    .push(Token::As)
                    .space()
                    .push(Token::Raw((*type_name).into()))
                    .rparen();
            }

            Expr::Star => {
                ts.push(Token::Star);
            }

            Expr::Paren(inner) => {
                ts.lparen();
                ts.append(&inner.to_tokens_for_dialect(dialect));
                ts.rparen();
            }

            Expr::Fragment(tokens) => {
                ts.append(tokens);
            }

            Expr::Raw(sql) => {
                ts.push(Token::Raw(sql.clone()));
            }
        }

        ts
    }

    /// Whether this expression is a predicate rather than a value.
    pub fn is_predicate(&self) -> bool {
        match self {
            Expr::BinaryOp { op, .. } => op.is_comparison() || op.is_logical(),
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                ..
            } => true,
            Expr::Exists(_) | Expr::In { .. } | Expr::IsNull { .. } | Expr::LikeEscape { .. } => {
                true
            }
            Expr::Paren(inner) => inner.is_predicate(),
            _ => false,
        }
    }
}

fn binary_op_to_token(op: BinaryOperator) -> Token {
    match op {
        BinaryOperator::Eq => Token::Eq,
        BinaryOperator::Ne => Token::Ne,
        BinaryOperator::Lt => Token::Lt,
        BinaryOperator::Gt => Token::Gt,
        BinaryOperator::Lte => Token::Lte,
        BinaryOperator::Gte => Token::Gte,
        BinaryOperator::And => Token::And,
        BinaryOperator::Or => Token::Or,
        BinaryOperator::Plus => Token::Plus,
        BinaryOperator::Minus => Token::Minus,
        BinaryOperator::Mul => Token::Mul,
        BinaryOperator::Div => Token::Div,
        BinaryOperator::Mod => Token::Mod,
        BinaryOperator::Concat => Token::Concat,
        BinaryOperator::Like => Token::Like,
    }
}

// =============================================================================
// Expression Constructors
// =============================================================================

/// COUNT(*)
pub fn count_star() -> Expr {
    func("COUNT", vec![Expr::Star])
}

/// A plain function call.
pub fn func(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Function {
        name: name.into(),
        args,
        distinct: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::test_utils::exprs::{binary, col, lit_int, lit_str, param, table_col};

    fn render(expr: &Expr, dialect: Dialect) -> String {
        expr.to_tokens_for_dialect(dialect).serialize(dialect)
    }

    #[test]
    fn test_column() {
        assert_eq!(render(&col("name"), Dialect::Postgres), "\"name\"");
        assert_eq!(render(&table_col("t0", "name"), Dialect::TSql), "[t0].[name]");
    }

    #[test]
    fn test_param_marker() {
        let expr = binary(col("Id"), BinaryOperator::Eq, param(0));
        assert_eq!(render(&expr, Dialect::Postgres), "\"Id\" = $1");
        assert_eq!(render(&expr, Dialect::TSql), "[Id] = @p0");
    }

    #[test]
    fn test_like_escape() {
        let expr = Expr::LikeEscape {
            expr: Box::new(col("name")),
            pattern: Box::new(lit_str("a!%%")),
            escape_char: '!',
            negated: false,
        };
        assert_eq!(render(&expr, Dialect::Sqlite), "\"name\" LIKE 'a!%%' ESCAPE '!'");
    }

    #[test]
    fn test_in_list_empty() {
        let expr = Expr::In {
            expr: Box::new(col("id")),
            values: vec![],
            negated: false,
        };
        assert_eq!(render(&expr, Dialect::TSql), "1 <> 1");
    }

    #[test]
    fn test_concat_per_dialect() {
        let expr = binary(col("first"), BinaryOperator::Concat, col("last"));
        assert_eq!(render(&expr, Dialect::MySql), "CONCAT(`first`, `last`)");
        assert_eq!(render(&expr, Dialect::TSql), "[first] + [last]");
    }

    #[test]
    fn test_dialect_threads_into_nested_exprs() {
        // The concat sits inside a function argument and a CASE branch.
        let concat = binary(col("a"), BinaryOperator::Concat, col("b"));
        let expr = Expr::Case {
            operand: None,
            when_clauses: vec![(
                Expr::IsNull {
                    expr: Box::new(col("x")),
                    negated: false,
                },
                func("UPPER", vec![concat]),
            )],
            else_clause: Some(Box::new(lit_str(""))),
        };
        assert_eq!(
            render(&expr, Dialect::MySql),
            "CASE WHEN `x` IS NULL THEN UPPER(CONCAT(`a`, `b`)) ELSE '' END"
        );
    }

    #[test]
    fn test_count_star_and_cast() {
        assert_eq!(render(&count_star(), Dialect::Sqlite), "COUNT(*)");
        let expr = Expr::Cast {
            expr: Box::new(col("n")),
            type_name: "TEXT",
        };
        assert_eq!(render(&expr, Dialect::Sqlite), "CAST(\"n\" AS TEXT)");
    }

    #[test]
    fn test_is_predicate() {
        assert!(binary(col("a"), BinaryOperator::Eq, lit_int(1)).is_predicate());
        assert!(Expr::Paren(Box::new(binary(col("a"), BinaryOperator::Or, col("b")))).is_predicate());
        assert!(!binary(col("a"), BinaryOperator::Plus, lit_int(1)).is_predicate());
        assert!(!col("a").is_predicate());
    }
}
