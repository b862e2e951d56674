//! Scalar expressions used inside predicates and selectors.
//!
//! Expressions are plain values built with free functions and chained
//! methods:
//!
//! ```ignore
//! field("CustomerId").eq(7).and(field("Total").gt(100.0))
//! field("Customer").field("Name").starts_with("A")
//! new_object([("Year", field("Date").year()), ("Orders", count())])
//! ```

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use crate::sql::{CastTarget, DatePart};
use crate::value::Value;

/// What a parameter reference points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Binding {
    /// The current row of the query.
    Row,
    /// The row of a joined source, by binding name.
    Source(String),
    /// The key of the current group.
    GroupKey,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Lte | Self::Gt | Self::Gte
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    /// The operator with its operands swapped: `a < b` is `b > a`.
    pub fn mirrored(self) -> Self {
        match self {
            Self::Lt => Self::Gt,
            Self::Lte => Self::Gte,
            Self::Gt => Self::Lt,
            Self::Gte => Self::Lte,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

/// Aggregate kinds, both as terminal query operations and inside projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateKind {
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

/// Built-in operations resolved per dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    StartsWith,
    EndsWith,
    Contains,
    ToUpper,
    ToLower,
    Trim,
    Length,
    /// Zero-based start, then length.
    Substring,
    Replace,
    Concat,
    Coalesce,
    /// First argument tested against the rest.
    In,
    DatePart(DatePart),
    AddDays,
    Now,
    Convert(CastTarget),
    /// Regular expression match.
    Matches,
    Aggregate(AggregateKind),
}

impl Function {
    /// Name used in error messages.
    pub fn describe(self) -> &'static str {
        match self {
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Contains => "contains",
            Self::ToUpper => "to_upper",
            Self::ToLower => "to_lower",
            Self::Trim => "trim",
            Self::Length => "length",
            Self::Substring => "substring",
            Self::Replace => "replace",
            Self::Concat => "concat",
            Self::Coalesce => "coalesce",
            Self::In => "is_in",
            Self::DatePart(_) => "date part",
            Self::AddDays => "add_days",
            Self::Now => "now",
            Self::Convert(_) => "conversion",
            Self::Matches => "regular expression match",
            Self::Aggregate(kind) => kind.sql_name(),
        }
    }
}

/// A scalar expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarExpr {
    Constant(Value),
    ParameterRef(Binding),
    FieldAccess {
        base: Box<ScalarExpr>,
        field: String,
    },
    BinaryOp {
        op: BinaryOp,
        left: Box<ScalarExpr>,
        right: Box<ScalarExpr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<ScalarExpr>,
    },
    Conditional {
        test: Box<ScalarExpr>,
        then: Box<ScalarExpr>,
        otherwise: Box<ScalarExpr>,
    },
    Call {
        function: Function,
        args: Vec<ScalarExpr>,
    },
    /// An anonymous record of named members.
    NewObject(Vec<(String, ScalarExpr)>),
    /// Members assigned onto a mapped entity type.
    MemberInit {
        type_name: &'static str,
        fields: Vec<(String, ScalarExpr)>,
    },
}

// =============================================================================
// Free constructors
// =============================================================================

/// A member of the current row.
pub fn field(name: &str) -> ScalarExpr {
    ScalarExpr::ParameterRef(Binding::Row).field(name)
}

/// The row of a joined source.
pub fn source(binding: &str) -> ScalarExpr {
    ScalarExpr::ParameterRef(Binding::Source(binding.to_string()))
}

/// The key of the current group.
pub fn key() -> ScalarExpr {
    ScalarExpr::ParameterRef(Binding::GroupKey)
}

pub fn lit(value: impl Into<Value>) -> ScalarExpr {
    ScalarExpr::Constant(value.into())
}

pub fn null() -> ScalarExpr {
    ScalarExpr::Constant(Value::Null)
}

/// `CASE WHEN test THEN then ELSE otherwise END`.
pub fn when(
    test: impl Into<ScalarExpr>,
    then: impl Into<ScalarExpr>,
    otherwise: impl Into<ScalarExpr>,
) -> ScalarExpr {
    ScalarExpr::Conditional {
        test: Box::new(test.into()),
        then: Box::new(then.into()),
        otherwise: Box::new(otherwise.into()),
    }
}

/// First non-null of two values.
pub fn coalesce(first: impl Into<ScalarExpr>, second: impl Into<ScalarExpr>) -> ScalarExpr {
    call(Function::Coalesce, vec![first.into(), second.into()])
}

pub fn now() -> ScalarExpr {
    call(Function::Now, Vec::new())
}

/// Row count of the current group or query.
pub fn count() -> ScalarExpr {
    call(Function::Aggregate(AggregateKind::Count), Vec::new())
}

pub fn sum(expr: impl Into<ScalarExpr>) -> ScalarExpr {
    call(Function::Aggregate(AggregateKind::Sum), vec![expr.into()])
}

pub fn avg(expr: impl Into<ScalarExpr>) -> ScalarExpr {
    call(Function::Aggregate(AggregateKind::Avg), vec![expr.into()])
}

pub fn min(expr: impl Into<ScalarExpr>) -> ScalarExpr {
    call(Function::Aggregate(AggregateKind::Min), vec![expr.into()])
}

pub fn max(expr: impl Into<ScalarExpr>) -> ScalarExpr {
    call(Function::Aggregate(AggregateKind::Max), vec![expr.into()])
}

/// An anonymous record; member order is the projected column order.
pub fn new_object<'a>(fields: impl IntoIterator<Item = (&'a str, ScalarExpr)>) -> ScalarExpr {
    ScalarExpr::NewObject(
        fields
            .into_iter()
            .map(|(name, expr)| (name.to_string(), expr))
            .collect(),
    )
}

/// Members assigned onto entity `U`, by field name.
pub fn member_init<'a, U: 'static>(
    fields: impl IntoIterator<Item = (&'a str, ScalarExpr)>,
) -> ScalarExpr {
    let full = std::any::type_name::<U>();
    ScalarExpr::MemberInit {
        type_name: full.rsplit("::").next().unwrap_or(full),
        fields: fields
            .into_iter()
            .map(|(name, expr)| (name.to_string(), expr))
            .collect(),
    }
}

fn call(function: Function, args: Vec<ScalarExpr>) -> ScalarExpr {
    ScalarExpr::Call { function, args }
}

// =============================================================================
// Chained operations
// =============================================================================

impl ScalarExpr {
    /// Member access: `field("Customer").field("Name")`.
    pub fn field(self, name: &str) -> ScalarExpr {
        ScalarExpr::FieldAccess {
            base: Box::new(self),
            field: name.to_string(),
        }
    }

    fn binary(self, op: BinaryOp, other: impl Into<ScalarExpr>) -> ScalarExpr {
        ScalarExpr::BinaryOp {
            op,
            left: Box::new(self),
            right: Box::new(other.into()),
        }
    }

    fn with(self, function: Function, rest: Vec<ScalarExpr>) -> ScalarExpr {
        let mut args = Vec::with_capacity(rest.len() + 1);
        args.push(self);
        args.extend(rest);
        call(function, args)
    }

    pub fn eq(self, other: impl Into<ScalarExpr>) -> ScalarExpr {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn ne(self, other: impl Into<ScalarExpr>) -> ScalarExpr {
        self.binary(BinaryOp::Ne, other)
    }

    pub fn lt(self, other: impl Into<ScalarExpr>) -> ScalarExpr {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn lte(self, other: impl Into<ScalarExpr>) -> ScalarExpr {
        self.binary(BinaryOp::Lte, other)
    }

    pub fn gt(self, other: impl Into<ScalarExpr>) -> ScalarExpr {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn gte(self, other: impl Into<ScalarExpr>) -> ScalarExpr {
        self.binary(BinaryOp::Gte, other)
    }

    pub fn and(self, other: impl Into<ScalarExpr>) -> ScalarExpr {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: impl Into<ScalarExpr>) -> ScalarExpr {
        self.binary(BinaryOp::Or, other)
    }

    pub fn not(self) -> ScalarExpr {
        ScalarExpr::UnaryOp {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }

    pub fn neg(self) -> ScalarExpr {
        ScalarExpr::UnaryOp {
            op: UnaryOp::Negate,
            operand: Box::new(self),
        }
    }

    pub fn add(self, other: impl Into<ScalarExpr>) -> ScalarExpr {
        self.binary(BinaryOp::Add, other)
    }

    pub fn sub(self, other: impl Into<ScalarExpr>) -> ScalarExpr {
        self.binary(BinaryOp::Sub, other)
    }

    pub fn mul(self, other: impl Into<ScalarExpr>) -> ScalarExpr {
        self.binary(BinaryOp::Mul, other)
    }

    pub fn div(self, other: impl Into<ScalarExpr>) -> ScalarExpr {
        self.binary(BinaryOp::Div, other)
    }

    pub fn rem(self, other: impl Into<ScalarExpr>) -> ScalarExpr {
        self.binary(BinaryOp::Rem, other)
    }

    pub fn is_null(self) -> ScalarExpr {
        self.eq(null())
    }

    pub fn is_not_null(self) -> ScalarExpr {
        self.ne(null())
    }

    pub fn is_in<I, V>(self, values: I) -> ScalarExpr
    where
        I: IntoIterator<Item = V>,
        V: Into<ScalarExpr>,
    {
        self.with(Function::In, values.into_iter().map(Into::into).collect())
    }

    pub fn starts_with(self, prefix: impl Into<ScalarExpr>) -> ScalarExpr {
        self.with(Function::StartsWith, vec![prefix.into()])
    }

    pub fn ends_with(self, suffix: impl Into<ScalarExpr>) -> ScalarExpr {
        self.with(Function::EndsWith, vec![suffix.into()])
    }

    pub fn contains(self, needle: impl Into<ScalarExpr>) -> ScalarExpr {
        self.with(Function::Contains, vec![needle.into()])
    }

    pub fn to_upper(self) -> ScalarExpr {
        self.with(Function::ToUpper, Vec::new())
    }

    pub fn to_lower(self) -> ScalarExpr {
        self.with(Function::ToLower, Vec::new())
    }

    pub fn trim(self) -> ScalarExpr {
        self.with(Function::Trim, Vec::new())
    }

    pub fn length(self) -> ScalarExpr {
        self.with(Function::Length, Vec::new())
    }

    /// Characters from zero-based `start`, at most `length` of them.
    pub fn substring(self, start: impl Into<ScalarExpr>, length: impl Into<ScalarExpr>) -> ScalarExpr {
        self.with(Function::Substring, vec![start.into(), length.into()])
    }

    pub fn replace(self, from: impl Into<ScalarExpr>, to: impl Into<ScalarExpr>) -> ScalarExpr {
        self.with(Function::Replace, vec![from.into(), to.into()])
    }

    pub fn concat(self, other: impl Into<ScalarExpr>) -> ScalarExpr {
        self.with(Function::Concat, vec![other.into()])
    }

    pub fn coalesce(self, fallback: impl Into<ScalarExpr>) -> ScalarExpr {
        coalesce(self, fallback)
    }

    pub fn year(self) -> ScalarExpr {
        self.with(Function::DatePart(DatePart::Year), Vec::new())
    }

    pub fn month(self) -> ScalarExpr {
        self.with(Function::DatePart(DatePart::Month), Vec::new())
    }

    pub fn day(self) -> ScalarExpr {
        self.with(Function::DatePart(DatePart::Day), Vec::new())
    }

    pub fn hour(self) -> ScalarExpr {
        self.with(Function::DatePart(DatePart::Hour), Vec::new())
    }

    pub fn minute(self) -> ScalarExpr {
        self.with(Function::DatePart(DatePart::Minute), Vec::new())
    }

    pub fn second(self) -> ScalarExpr {
        self.with(Function::DatePart(DatePart::Second), Vec::new())
    }

    pub fn add_days(self, days: impl Into<ScalarExpr>) -> ScalarExpr {
        self.with(Function::AddDays, vec![days.into()])
    }

    pub fn to_text(self) -> ScalarExpr {
        self.with(Function::Convert(CastTarget::Text), Vec::new())
    }

    pub fn to_int(self) -> ScalarExpr {
        self.with(Function::Convert(CastTarget::Int), Vec::new())
    }

    pub fn to_float(self) -> ScalarExpr {
        self.with(Function::Convert(CastTarget::Float), Vec::new())
    }

    /// Regular expression match.
    pub fn matches(self, pattern: impl Into<ScalarExpr>) -> ScalarExpr {
        self.with(Function::Matches, vec![pattern.into()])
    }

    /// Whether this tree contains an aggregate call.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            ScalarExpr::Call {
                function: Function::Aggregate(_),
                ..
            } => true,
            ScalarExpr::Call { args, .. } => args.iter().any(Self::contains_aggregate),
            ScalarExpr::FieldAccess { base, .. } => base.contains_aggregate(),
            ScalarExpr::BinaryOp { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            ScalarExpr::UnaryOp { operand, .. } => operand.contains_aggregate(),
            ScalarExpr::Conditional {
                test,
                then,
                otherwise,
            } => test.contains_aggregate() || then.contains_aggregate() || otherwise.contains_aggregate(),
            ScalarExpr::NewObject(fields) | ScalarExpr::MemberInit { fields, .. } => {
                fields.iter().any(|(_, e)| e.contains_aggregate())
            }
            ScalarExpr::Constant(_) | ScalarExpr::ParameterRef(_) => false,
        }
    }
}

macro_rules! scalar_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ScalarExpr {
                fn from(v: $ty) -> Self {
                    ScalarExpr::Constant(v.into())
                }
            }
        )*
    };
}

scalar_from!(
    bool,
    i64,
    i32,
    f64,
    String,
    &str,
    Vec<u8>,
    NaiveDate,
    NaiveTime,
    NaiveDateTime,
    Uuid,
    Value,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_chain() {
        let expr = field("Customer").field("Name");
        let ScalarExpr::FieldAccess { base, field: name } = expr else {
            panic!("expected field access");
        };
        assert_eq!(name, "Name");
        assert_eq!(
            *base,
            ScalarExpr::FieldAccess {
                base: Box::new(ScalarExpr::ParameterRef(Binding::Row)),
                field: "Customer".into()
            }
        );
    }

    #[test]
    fn test_constants_convert() {
        assert_eq!(ScalarExpr::from(7), ScalarExpr::Constant(Value::Int(7)));
        assert_eq!(lit("x"), ScalarExpr::Constant(Value::Text("x".into())));
        assert_eq!(null(), ScalarExpr::Constant(Value::Null));
    }

    #[test]
    fn test_is_in_collects_args() {
        let ScalarExpr::Call { function, args } = field("Id").is_in([1, 2, 3]) else {
            panic!("expected call");
        };
        assert_eq!(function, Function::In);
        assert_eq!(args.len(), 4);
    }

    #[test]
    fn test_contains_aggregate() {
        assert!(new_object([("n", count())]).contains_aggregate());
        assert!(sum(field("Total")).add(1).contains_aggregate());
        assert!(!field("Total").add(1).contains_aggregate());
    }

    #[test]
    fn test_mirrored() {
        assert_eq!(BinaryOp::Lt.mirrored(), BinaryOp::Gt);
        assert_eq!(BinaryOp::Eq.mirrored(), BinaryOp::Eq);
    }
}
