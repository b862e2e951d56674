//! Built-in function resolution.
//!
//! Maps [`Function`] calls to SQL, consulting the dialect for everything that
//! differs between servers (date parts, day arithmetic, casts, regular
//! expressions). String matching with a constant pattern becomes an escaped
//! `LIKE`, so `%`, `_` and `[` in user text stay literal.

use crate::ast::{Function, ScalarExpr};
use crate::error::{QuarryError, QuarryResult};
use crate::sql::expr::func;
use crate::sql::{BinaryOperator, Expr, Literal, SqlDialect};
use crate::value::{TypeHint, Value};

use super::context::{ColumnInfo, Typed, PREC_ADD, PREC_ATOM, PREC_COMPARE};
use super::visitor::{binary_expr, Resolved, Visitor};

/// Escape character used for every generated `LIKE`.
const LIKE_ESCAPE: char = '\\';

pub(crate) fn call(v: &mut Visitor<'_, '_>, function: Function, args: &[ScalarExpr]) -> QuarryResult<Typed> {
    match function {
        Function::StartsWith | Function::EndsWith | Function::Contains => {
            let [subject, pattern] = arity::<2>(v, function, args)?;
            like(v, function, subject, pattern)
        }
        Function::ToUpper => unary(v, function, args, "UPPER"),
        Function::ToLower => unary(v, function, args, "LOWER"),
        Function::Trim => unary(v, function, args, "TRIM"),
        Function::Length => {
            let [subject] = arity::<1>(v, function, args)?;
            let subject = v.scalar(subject)?;
            Ok(Typed::atom(
                func("LENGTH", vec![subject.expr]),
                ColumnInfo::hint(TypeHint::Int),
            ))
        }
        Function::Substring => {
            let [subject, start, length] = arity::<3>(v, function, args)?;
            let subject = v.scalar(subject)?;
            let int = ColumnInfo::hint(TypeHint::Int);
            // SQL positions are one-based
            let start = match v.resolve(start)? {
                Resolved::Constant(Value::Int(n)) => {
                    let n = n
                        .checked_add(1)
                        .ok_or_else(|| v.ctx.validation("substring start is out of range"))?;
                    v.ctx.constant(Value::Int(n), int)?.expr
                }
                other => {
                    let start = v.typed(other, int)?;
                    binary_expr(
                        start.at_least(PREC_ADD),
                        BinaryOperator::Plus,
                        Expr::Literal(Literal::Int(1)),
                    )
                }
            };
            let length = v.value_with(length, int)?;
            let info = ColumnInfo {
                size: None,
                ..subject.info
            };
            Ok(Typed::atom(
                func("SUBSTRING", vec![subject.expr, start, length.expr]),
                info,
            ))
        }
        Function::Replace => {
            let [subject, from, to] = arity::<3>(v, function, args)?;
            let subject = v.scalar(subject)?;
            let text = ColumnInfo {
                size: None,
                ..subject.info
            };
            let from = v.value_with(from, text)?;
            let to = v.value_with(to, text)?;
            Ok(Typed::atom(
                func("REPLACE", vec![subject.expr, from.expr, to.expr]),
                text,
            ))
        }
        Function::Concat => {
            let [left, right] = arity::<2>(v, function, args)?;
            let left = v.scalar(left)?;
            let info = ColumnInfo {
                size: None,
                ..left.info
            };
            let right = v.value_with(right, info)?;
            Ok(Typed::new(
                binary_expr(
                    left.at_least(PREC_ADD),
                    BinaryOperator::Concat,
                    right.at_least(PREC_ADD + 1),
                ),
                PREC_ADD,
                info,
            ))
        }
        Function::Coalesce => {
            let [first, second] = arity::<2>(v, function, args)?;
            let first = v.scalar(first)?;
            let second = v.value_with(second, first.info)?;
            let info = first.info;
            Ok(Typed::atom(func("COALESCE", vec![first.expr, second.expr]), info))
        }
        Function::In => {
            let Some((subject, values)) = args.split_first() else {
                return Err(arity_error(v, function, 1));
            };
            let subject = v.scalar(subject)?;
            let info = subject.info;
            let values = values
                .iter()
                .map(|value| v.value_with(value, info).map(|t| t.expr))
                .collect::<QuarryResult<Vec<_>>>()?;
            Ok(Typed::predicate(
                Expr::In {
                    expr: Box::new(subject.at_least(PREC_ADD)),
                    values,
                    negated: false,
                },
                PREC_COMPARE,
            ))
        }
        Function::DatePart(part) => {
            let [subject] = arity::<1>(v, function, args)?;
            let subject = v.scalar(subject)?;
            let dialect = v.ctx.dialect;
            let tokens = subject.at_least(PREC_ATOM).to_tokens_for_dialect(dialect);
            Ok(Typed::atom(
                Expr::Fragment(dialect.emit_date_part(part, tokens)),
                ColumnInfo::hint(TypeHint::Int),
            ))
        }
        Function::AddDays => {
            let [subject, days] = arity::<2>(v, function, args)?;
            let subject = v.scalar(subject)?;
            let days = v.value_with(days, ColumnInfo::hint(TypeHint::Int))?;
            let dialect = v.ctx.dialect;
            let info = subject.info;
            let fragment = dialect.emit_add_days(
                subject.at_least(PREC_ATOM).to_tokens_for_dialect(dialect),
                days.at_least(PREC_ATOM).to_tokens_for_dialect(dialect),
            );
            Ok(Typed::atom(Expr::Fragment(fragment), info))
        }
        Function::Now => {
            arity::<0>(v, function, args)?;
            Ok(Typed::atom(
                Expr::Fragment(v.ctx.dialect.emit_now()),
                ColumnInfo::hint(TypeHint::DateTime),
            ))
        }
        Function::Convert(target) => {
            let [subject] = arity::<1>(v, function, args)?;
            let subject = v.scalar(subject)?;
            let hint = match target {
                crate::sql::CastTarget::Text => TypeHint::Text { unicode: true },
                crate::sql::CastTarget::Int => TypeHint::Int,
                crate::sql::CastTarget::Float => TypeHint::Float,
            };
            Ok(Typed::atom(
                Expr::Cast {
                    expr: Box::new(subject.expr),
                    type_name: v.ctx.dialect.cast_type_name(target),
                },
                ColumnInfo::hint(hint),
            ))
        }
        Function::Matches => {
            let [subject, pattern] = arity::<2>(v, function, args)?;
            let subject = v.scalar(subject)?;
            let text = ColumnInfo {
                size: None,
                ..subject.info
            };
            let pattern = v.value_with(pattern, text)?;
            let dialect = v.ctx.dialect;
            let fragment = dialect
                .emit_regex_match(
                    subject.at_least(PREC_ADD).to_tokens_for_dialect(dialect),
                    pattern.at_least(PREC_ADD).to_tokens_for_dialect(dialect),
                )
                .ok_or_else(|| QuarryError::translation(function.describe(), dialect))?;
            Ok(Typed::predicate(Expr::Fragment(fragment), PREC_COMPARE))
        }
        Function::Aggregate(kind) => v.aggregate(kind, args),
    }
}

fn unary(
    v: &mut Visitor<'_, '_>,
    function: Function,
    args: &[ScalarExpr],
    name: &str,
) -> QuarryResult<Typed> {
    let [subject] = arity::<1>(v, function, args)?;
    let subject = v.scalar(subject)?;
    let info = subject.info;
    Ok(Typed::atom(func(name, vec![subject.expr]), info))
}

/// `starts_with`, `ends_with` and `contains`.
fn like(
    v: &mut Visitor<'_, '_>,
    function: Function,
    subject: &ScalarExpr,
    pattern: &ScalarExpr,
) -> QuarryResult<Typed> {
    let subject = v.scalar(subject)?;
    let text = ColumnInfo {
        size: None,
        ..subject.info
    };

    match v.resolve(pattern)? {
        Resolved::Constant(Value::Text(needle)) => {
            let escaped = escape_like(&needle);
            let pattern = match function {
                Function::StartsWith => format!("{escaped}%"),
                Function::EndsWith => format!("%{escaped}"),
                _ => format!("%{escaped}%"),
            };
            let pattern = v.ctx.constant(Value::Text(pattern), text)?;
            Ok(Typed::predicate(
                Expr::LikeEscape {
                    expr: Box::new(subject.at_least(PREC_ADD)),
                    pattern: Box::new(pattern.expr),
                    escape_char: LIKE_ESCAPE,
                    negated: false,
                },
                PREC_COMPARE,
            ))
        }
        Resolved::Constant(Value::Null) => Err(v
            .ctx
            .validation(format!("{} cannot match a NULL pattern", function.describe()))),
        other => {
            let needle = v.typed(other, text)?.at_least(PREC_ADD + 1);
            let wildcard = || Expr::Literal(Literal::String("%".into()));
            let concat = |l: Expr, r: Expr| binary_expr(l, BinaryOperator::Concat, r);
            let pattern = match function {
                Function::StartsWith => concat(needle, wildcard()),
                Function::EndsWith => concat(wildcard(), needle),
                _ => concat(concat(wildcard(), needle), wildcard()),
            };
            Ok(Typed::predicate(
                binary_expr(
                    subject.at_least(PREC_ADD),
                    BinaryOperator::Like,
                    Expr::Paren(Box::new(pattern)),
                ),
                PREC_COMPARE,
            ))
        }
    }
}

/// Escape `LIKE` metacharacters with [`LIKE_ESCAPE`].
pub(crate) fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_' | '[') {
            out.push(LIKE_ESCAPE);
        }
        out.push(ch);
    }
    out
}

fn arity<'e, const N: usize>(
    v: &Visitor<'_, '_>,
    function: Function,
    args: &'e [ScalarExpr],
) -> QuarryResult<[&'e ScalarExpr; N]> {
    let refs: Vec<&ScalarExpr> = args.iter().collect();
    refs.try_into().map_err(|_| arity_error(v, function, N))
}

fn arity_error(v: &Visitor<'_, '_>, function: Function, expected: usize) -> QuarryError {
    v.ctx.validation(format!(
        "{} takes {} argument(s) including its subject",
        function.describe(),
        expected
    ))
}
