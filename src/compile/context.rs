//! State threaded through one compile.

use std::sync::Arc;

use crate::command::Parameter;
use crate::error::{QuarryError, QuarryResult};
use crate::metadata::{ColumnMeta, EntityMetadata, MetadataRegistry};
use crate::sql::{Dialect, Expr, Literal};
use crate::value::{TypeHint, Value};

// =============================================================================
// Precedence
// =============================================================================

pub(crate) const PREC_OR: u8 = 1;
pub(crate) const PREC_AND: u8 = 2;
pub(crate) const PREC_NOT: u8 = 3;
pub(crate) const PREC_COMPARE: u8 = 4;
pub(crate) const PREC_ADD: u8 = 5;
pub(crate) const PREC_MUL: u8 = 6;
pub(crate) const PREC_NEGATE: u8 = 7;
pub(crate) const PREC_ATOM: u8 = 8;

/// Declared type of the column an expression reads, used to type constants
/// compared against it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct ColumnInfo {
    pub hint: TypeHint,
    pub size: Option<u32>,
    pub scale: Option<u8>,
}

impl ColumnInfo {
    pub fn of(column: &ColumnMeta) -> Self {
        Self {
            hint: column.type_hint,
            size: column.size,
            scale: column.scale,
        }
    }

    pub fn hint(hint: TypeHint) -> Self {
        Self {
            hint,
            ..Default::default()
        }
    }
}

/// A rendered SQL expression with its binding strength and type.
#[derive(Debug, Clone)]
pub(crate) struct Typed {
    pub expr: Expr,
    pub prec: u8,
    pub info: ColumnInfo,
    /// Set for dialect fragments that are conditions (regex matches).
    condition: bool,
}

impl Typed {
    pub fn atom(expr: Expr, info: ColumnInfo) -> Self {
        Self::new(expr, PREC_ATOM, info)
    }

    pub fn new(expr: Expr, prec: u8, info: ColumnInfo) -> Self {
        Self {
            expr,
            prec,
            info,
            condition: false,
        }
    }

    pub fn predicate(expr: Expr, prec: u8) -> Self {
        Self {
            expr,
            prec,
            info: ColumnInfo::hint(TypeHint::Bool),
            condition: true,
        }
    }

    /// The expression, parenthesized when it binds looser than `min`.
    pub fn at_least(self, min: u8) -> Expr {
        if self.prec < min {
            Expr::Paren(Box::new(self.expr))
        } else {
            self.expr
        }
    }

    pub fn is_predicate(&self) -> bool {
        self.condition || self.expr.is_predicate()
    }
}

/// A named value of a projected row.
#[derive(Debug, Clone)]
pub(crate) struct Member {
    pub name: String,
    pub value: Typed,
}

/// What the rows of a select level look like to the expressions applied to
/// them.
#[derive(Debug, Clone)]
pub(crate) enum RowShape {
    /// Rows of a mapped table under `alias`.
    Entity {
        alias: String,
        meta: Arc<EntityMetadata>,
    },
    /// Projected members.
    Members(Vec<Member>),
    /// Groups: the key (a single member, or several when `composite`) and the
    /// shape of the rows inside each group.
    Grouped {
        key: Vec<Member>,
        composite: bool,
        rows: Box<RowShape>,
    },
    /// A single aggregate or existence value.
    Scalar,
}

// =============================================================================
// Compile context
// =============================================================================

/// Per-compile settings and accumulated parameters.
pub(crate) struct Context {
    pub dialect: Dialect,
    pub parameterize: bool,
    pub registry: Arc<MetadataRegistry>,
    pub params: Vec<Parameter>,
    /// Operation being compiled, named in error messages.
    pub clause: &'static str,
    hidden: usize,
}

impl Context {
    pub fn new(dialect: Dialect, parameterize: bool, registry: Arc<MetadataRegistry>) -> Self {
        Self {
            dialect,
            parameterize,
            registry,
            params: Vec::new(),
            clause: "source",
            hidden: 0,
        }
    }

    pub fn validation(&self, message: impl Into<String>) -> QuarryError {
        QuarryError::validation(self.clause, message)
    }

    /// Name for a helper column (`__o0`, `__s1`, ..).
    pub fn hidden_name(&mut self, prefix: char) -> String {
        let n = self.hidden;
        self.hidden += 1;
        format!("__{prefix}{n}")
    }

    /// Render a constant: a bound parameter, or an inline literal when
    /// parameterization is off. NULL is always inline.
    pub fn constant(&mut self, value: Value, info: ColumnInfo) -> QuarryResult<Typed> {
        let hint = match info.hint {
            TypeHint::Unknown => value.type_hint(),
            hint => hint,
        };

        if value.is_null() {
            return Ok(Typed::atom(Expr::Literal(Literal::Null), info));
        }

        if self.parameterize {
            let ordinal = self.params.len();
            self.params.push(Parameter {
                name: format!("p{ordinal}"),
                value,
                hint,
                size: info.size,
                scale: info.scale,
            });
            return Ok(Typed::atom(Expr::Param(ordinal), ColumnInfo { hint, ..info }));
        }

        let literal = match value {
            Value::Null => Literal::Null,
            Value::Bool(b) => Literal::Bool(b),
            Value::Int(n) => Literal::Int(n),
            Value::Float(f) if !f.is_finite() => {
                return Err(self.validation(format!("{f} cannot be written as a SQL literal")));
            }
            Value::Float(f) => Literal::Float(f),
            Value::Text(s) => match hint {
                TypeHint::Text { unicode: true } => Literal::NString(s),
                _ => Literal::String(s),
            },
            Value::Bytes(b) => Literal::Bytes(b),
            Value::Date(d) => Literal::Date(d),
            Value::Time(t) => Literal::Time(t),
            Value::DateTime(dt) => Literal::DateTime(dt, info.scale),
            Value::Guid(g) => Literal::Guid(g),
        };
        Ok(Typed::atom(Expr::Literal(literal), ColumnInfo { hint, ..info }))
    }
}
