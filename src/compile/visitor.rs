//! Scalar expression visitor.
//!
//! Walks a [`ScalarExpr`] against the row shape of one select level and
//! produces SQL expressions:
//!
//! ```text
//!   field("Customer").field("Name")        LEFT JOIN Customers t1 ON ..
//!       │                                  t1.Name
//!       ▼
//!   Resolved::Row(t1, Customer) ──► Resolved::Value(t1.Name)
//! ```
//!
//! Constants are deferred as [`Resolved::Constant`] until the operator that
//! consumes them knows which column they are compared with, so bound
//! parameters carry that column's type, size and scale.

use std::sync::Arc;

use crate::ast::{AggregateKind, BinaryOp, Binding, Function, ScalarExpr, UnaryOp};
use crate::error::QuarryResult;
use crate::metadata::{EntityMetadata, ForeignKeyLink};
use crate::sql::expr::{count_star, func};
use crate::sql::{BinaryOperator, Expr, FromSource, Join, JoinType, Literal, UnaryOperator};
use crate::value::{TypeHint, Value};

use super::alias::{AliasRegistry, SourceKey};
use super::context::{
    ColumnInfo, Context, Member, RowShape, Typed, PREC_ADD, PREC_AND, PREC_ATOM, PREC_COMPARE,
    PREC_MUL, PREC_NEGATE, PREC_NOT, PREC_OR,
};
use super::functions;

/// Outcome of resolving an expression before it is forced into a value.
#[derive(Debug, Clone)]
pub(crate) enum Resolved {
    Value(Typed),
    Constant(Value),
    /// A whole row of a mapped table.
    Row {
        alias: String,
        meta: Arc<EntityMetadata>,
    },
    /// A projected record or composite group key.
    Record(Vec<Member>),
}

/// Row shapes visible to an expression.
#[derive(Clone, Copy)]
pub(crate) struct Scope<'s> {
    pub row: &'s RowShape,
    pub sources: &'s [(String, RowShape)],
}

pub(crate) struct Visitor<'a, 's> {
    pub ctx: &'a mut Context,
    /// Receives LEFT JOINs for reference navigations.
    pub joins: &'a mut Vec<Join>,
    pub aliases: &'a mut AliasRegistry,
    pub scope: Scope<'s>,
}

impl<'a, 's> Visitor<'a, 's> {
    /// A value expression.
    pub fn scalar(&mut self, expr: &ScalarExpr) -> QuarryResult<Typed> {
        self.value_with(expr, ColumnInfo::default())
    }

    /// A value expression; a constant takes the type in `info`.
    pub fn value_with(&mut self, expr: &ScalarExpr, info: ColumnInfo) -> QuarryResult<Typed> {
        let resolved = self.resolve(expr)?;
        self.typed(resolved, info)
    }

    /// A condition. Bare boolean members become `member = TRUE` and boolean
    /// constants become `1 = 1` / `1 = 0`.
    pub fn predicate(&mut self, expr: &ScalarExpr) -> QuarryResult<Typed> {
        let resolved = self.resolve(expr)?;
        self.coerce(resolved)
    }

    /// Named members of a projection or group key. A selector that is not a
    /// record yields one member named after the field it reads.
    pub fn members(&mut self, expr: &ScalarExpr) -> QuarryResult<Vec<Member>> {
        match expr {
            ScalarExpr::NewObject(fields) | ScalarExpr::MemberInit { fields, .. } => fields
                .iter()
                .map(|(name, e)| {
                    Ok(Member {
                        name: name.clone(),
                        value: self.scalar(e)?,
                    })
                })
                .collect(),
            other => {
                let name = match other {
                    ScalarExpr::FieldAccess { field, .. } => field.clone(),
                    _ => "Value".to_string(),
                };
                match self.resolve(other)? {
                    Resolved::Record(members) => Ok(members),
                    resolved => Ok(vec![Member {
                        name,
                        value: self.typed(resolved, ColumnInfo::default())?,
                    }]),
                }
            }
        }
    }

    pub fn resolve(&mut self, expr: &ScalarExpr) -> QuarryResult<Resolved> {
        match expr {
            ScalarExpr::Constant(value) => Ok(Resolved::Constant(value.clone())),
            ScalarExpr::ParameterRef(binding) => self.binding(binding),
            ScalarExpr::FieldAccess { base, field } => {
                let base = self.resolve(base)?;
                self.member(base, field)
            }
            ScalarExpr::BinaryOp { op, left, right } => self.binary(*op, left, right).map(Resolved::Value),
            ScalarExpr::UnaryOp {
                op: UnaryOp::Not,
                operand,
            } => self.not(operand).map(Resolved::Value),
            ScalarExpr::UnaryOp {
                op: UnaryOp::Negate,
                operand,
            } => self.negate(operand),
            ScalarExpr::Conditional {
                test,
                then,
                otherwise,
            } => self.conditional(test, then, otherwise).map(Resolved::Value),
            ScalarExpr::Call {
                function: Function::Aggregate(kind),
                args,
            } => self.aggregate(*kind, args).map(Resolved::Value),
            ScalarExpr::Call { function, args } => {
                functions::call(self, *function, args).map(Resolved::Value)
            }
            ScalarExpr::NewObject(_) | ScalarExpr::MemberInit { .. } => {
                self.members(expr).map(Resolved::Record)
            }
        }
    }

    /// Force a resolved expression into a single value.
    pub fn typed(&mut self, resolved: Resolved, info: ColumnInfo) -> QuarryResult<Typed> {
        match resolved {
            Resolved::Value(typed) => Ok(typed),
            Resolved::Constant(value) => self.ctx.constant(value, info),
            Resolved::Row { meta, .. } => Err(self.ctx.validation(format!(
                "{} is a whole row; select one of its members",
                meta.type_name
            ))),
            Resolved::Record(_) => Err(self
                .ctx
                .validation("a record of several members cannot be used as a single value")),
        }
    }

    fn coerce(&mut self, resolved: Resolved) -> QuarryResult<Typed> {
        match resolved {
            Resolved::Constant(Value::Bool(b)) => Ok(bool_constant(b)),
            other => {
                let typed = self.typed(other, ColumnInfo::hint(TypeHint::Bool))?;
                if typed.is_predicate() {
                    Ok(typed)
                } else if typed.info.hint.is_bool() {
                    Ok(compare_bool(typed, true))
                } else {
                    Err(self
                        .ctx
                        .validation("expression is not a condition; compare it with a value"))
                }
            }
        }
    }

    // =========================================================================
    // Members and bindings
    // =========================================================================

    fn binding(&mut self, binding: &Binding) -> QuarryResult<Resolved> {
        match binding {
            Binding::Row => self.shape(self.scope.row),
            Binding::Source(name) => {
                let found = self
                    .scope
                    .sources
                    .iter()
                    .find(|(binding, _)| binding == name)
                    .map(|(_, shape)| shape);
                match found {
                    Some(shape) => self.shape(shape),
                    None => Err(self.ctx.validation(format!(
                        "no joined source named {name} is visible here"
                    ))),
                }
            }
            Binding::GroupKey => match self.scope.row {
                RowShape::Grouped {
                    key,
                    composite: true,
                    ..
                } => Ok(Resolved::Record(key.clone())),
                RowShape::Grouped { key, .. } => match key.first() {
                    Some(member) => Ok(Resolved::Value(member.value.clone())),
                    None => Err(self.ctx.validation("the group key is empty")),
                },
                _ => Err(self.ctx.validation("key() is only available after group_by")),
            },
        }
    }

    fn shape(&self, shape: &RowShape) -> QuarryResult<Resolved> {
        match shape {
            RowShape::Entity { alias, meta } => Ok(Resolved::Row {
                alias: alias.clone(),
                meta: Arc::clone(meta),
            }),
            RowShape::Members(members) => Ok(Resolved::Record(members.clone())),
            RowShape::Grouped { .. } => Err(self.ctx.validation(
                "rows of a group can only be read inside an aggregate; use key() for the group key",
            )),
            RowShape::Scalar => Err(self.ctx.validation("an aggregate result has no members")),
        }
    }

    fn member(&mut self, base: Resolved, field: &str) -> QuarryResult<Resolved> {
        match base {
            Resolved::Row { alias, meta } => {
                if let Some(column) = meta.column(field) {
                    return Ok(Resolved::Value(Typed::atom(
                        Expr::Column {
                            table: Some(alias),
                            column: column.name.clone(),
                        },
                        ColumnInfo::of(column),
                    )));
                }
                match meta.link(field) {
                    Some(link) if link.is_collection => Err(self.ctx.validation(format!(
                        "collection navigation {}.{} cannot be used in an expression; include it instead",
                        meta.type_name, field
                    ))),
                    Some(link) => self.navigate(&alias, &meta, link),
                    None => Err(self
                        .ctx
                        .validation(format!("{} has no member {}", meta.type_name, field))),
                }
            }
            Resolved::Record(members) => members
                .into_iter()
                .find(|m| m.name == field)
                .map(|m| Resolved::Value(m.value))
                .ok_or_else(|| self.ctx.validation(format!("no member {field} in the selected record"))),
            Resolved::Value(_) | Resolved::Constant(_) => Err(self
                .ctx
                .validation(format!("cannot read member {field} of a single value"))),
        }
    }

    /// Join the target of a reference navigation, once per owner alias.
    fn navigate(
        &mut self,
        owner_alias: &str,
        owner: &EntityMetadata,
        link: &ForeignKeyLink,
    ) -> QuarryResult<Resolved> {
        let target = link.target_metadata(&self.ctx.registry);
        let key = SourceKey::Navigation(format!("{owner_alias}.{}", link.member));
        let (alias, is_new) = self.aliases.resolve(key);
        if is_new {
            let on = link_condition(self.ctx, owner_alias, owner, link, &alias, &target)?;
            self.joins.push(Join {
                join_type: JoinType::Left,
                source: FromSource::Table(target.table_ref().with_alias(&alias)),
                on: Some(on),
            });
        }
        Ok(Resolved::Row { alias, meta: target })
    }

    // =========================================================================
    // Operators
    // =========================================================================

    fn binary(&mut self, op: BinaryOp, left: &ScalarExpr, right: &ScalarExpr) -> QuarryResult<Typed> {
        if op.is_logical() {
            let prec = if op == BinaryOp::And { PREC_AND } else { PREC_OR };
            let l = self.predicate(left)?;
            let r = self.predicate(right)?;
            let sql_op = if op == BinaryOp::And {
                BinaryOperator::And
            } else {
                BinaryOperator::Or
            };
            return Ok(Typed::predicate(
                binary_expr(l.at_least(prec), sql_op, r.at_least(prec)),
                prec,
            ));
        }

        if op.is_comparison() {
            return self.comparison(op, left, right);
        }

        let (prec, sql_op) = match op {
            BinaryOp::Add => (PREC_ADD, BinaryOperator::Plus),
            BinaryOp::Sub => (PREC_ADD, BinaryOperator::Minus),
            BinaryOp::Mul => (PREC_MUL, BinaryOperator::Mul),
            BinaryOp::Div => (PREC_MUL, BinaryOperator::Div),
            _ => (PREC_MUL, BinaryOperator::Mod),
        };
        let (l, r) = self.operands(left, right)?;
        let info = if l.info.hint == TypeHint::Unknown { r.info } else { l.info };
        Ok(Typed::new(
            binary_expr(l.at_least(prec), sql_op, r.at_least(prec + 1)),
            prec,
            info,
        ))
    }

    /// Resolve two operands, typing a constant on either side after the
    /// other side.
    fn operands(&mut self, left: &ScalarExpr, right: &ScalarExpr) -> QuarryResult<(Typed, Typed)> {
        let l = self.resolve(left)?;
        let r = self.resolve(right)?;
        match (l, r) {
            (l @ Resolved::Constant(_), r) if !matches!(r, Resolved::Constant(_)) => {
                let r = self.typed(r, ColumnInfo::default())?;
                let l = self.typed(l, r.info)?;
                Ok((l, r))
            }
            (l, r) => {
                let l = self.typed(l, ColumnInfo::default())?;
                let r = self.typed(r, l.info)?;
                Ok((l, r))
            }
        }
    }

    fn comparison(&mut self, op: BinaryOp, left: &ScalarExpr, right: &ScalarExpr) -> QuarryResult<Typed> {
        let mut l = self.resolve(left)?;
        let mut r = self.resolve(right)?;
        let mut op = op;

        // Constants go on the right.
        if matches!(l, Resolved::Constant(_)) && !matches!(r, Resolved::Constant(_)) {
            std::mem::swap(&mut l, &mut r);
            op = op.mirrored();
        }

        if matches!(r, Resolved::Constant(Value::Null)) && matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
            let subject = self.typed(l, ColumnInfo::default())?;
            return Ok(Typed::predicate(
                Expr::IsNull {
                    expr: Box::new(subject.at_least(PREC_ADD)),
                    negated: op == BinaryOp::Ne,
                },
                PREC_COMPARE,
            ));
        }

        if let (Resolved::Record(a), Resolved::Record(b)) = (&l, &r) {
            return self.record_equality(op, a.clone(), b.clone());
        }

        let l = self.typed(l, ColumnInfo::default())?;
        let r = self.typed(r, l.info)?;
        Ok(Typed::predicate(
            binary_expr(l.at_least(PREC_ADD), comparison_operator(op), r.at_least(PREC_ADD)),
            PREC_COMPARE,
        ))
    }

    /// `new_object(..) == new_object(..)`: member-wise equality.
    fn record_equality(&mut self, op: BinaryOp, a: Vec<Member>, b: Vec<Member>) -> QuarryResult<Typed> {
        if op != BinaryOp::Eq || a.len() != b.len() || a.is_empty() {
            return Err(self
                .ctx
                .validation("records can only be compared for equality, member by member"));
        }
        let parts: Vec<Expr> = a
            .into_iter()
            .zip(b)
            .map(|(x, y)| {
                binary_expr(
                    x.value.at_least(PREC_ADD),
                    BinaryOperator::Eq,
                    y.value.at_least(PREC_ADD),
                )
            })
            .collect();
        Ok(and_all(parts)
            .map(|e| Typed::predicate(e, PREC_AND))
            .unwrap_or_else(|| bool_constant(true)))
    }

    fn not(&mut self, operand: &ScalarExpr) -> QuarryResult<Typed> {
        match self.resolve(operand)? {
            Resolved::Constant(Value::Bool(b)) => Ok(bool_constant(!b)),
            Resolved::Value(typed) if !typed.is_predicate() && typed.info.hint.is_bool() => {
                Ok(compare_bool(typed, false))
            }
            other => {
                let inner = self.coerce(other)?;
                Ok(Typed::predicate(
                    Expr::UnaryOp {
                        op: UnaryOperator::Not,
                        expr: Box::new(inner.at_least(PREC_ATOM)),
                    },
                    PREC_NOT,
                ))
            }
        }
    }

    fn negate(&mut self, operand: &ScalarExpr) -> QuarryResult<Resolved> {
        match self.resolve(operand)? {
            Resolved::Constant(Value::Int(n)) => Ok(Resolved::Constant(Value::Int(-n))),
            Resolved::Constant(Value::Float(f)) => Ok(Resolved::Constant(Value::Float(-f))),
            other => {
                let typed = self.typed(other, ColumnInfo::default())?;
                let info = typed.info;
                Ok(Resolved::Value(Typed::new(
                    Expr::UnaryOp {
                        op: UnaryOperator::Minus,
                        expr: Box::new(typed.at_least(PREC_ATOM)),
                    },
                    PREC_NEGATE,
                    info,
                )))
            }
        }
    }

    fn conditional(
        &mut self,
        test: &ScalarExpr,
        then: &ScalarExpr,
        otherwise: &ScalarExpr,
    ) -> QuarryResult<Typed> {
        let test = self.predicate(test)?;
        let (then, otherwise) = self.operands(then, otherwise)?;
        let info = then.info;
        Ok(Typed::atom(
            Expr::Case {
                operand: None,
                when_clauses: vec![(test.expr, then.expr)],
                else_clause: Some(Box::new(otherwise.expr)),
            },
            info,
        ))
    }

    /// Aggregates read the rows inside the current group.
    pub fn aggregate(&mut self, kind: AggregateKind, args: &[ScalarExpr]) -> QuarryResult<Typed> {
        if kind == AggregateKind::Count {
            return Ok(Typed::atom(count_star(), ColumnInfo::hint(TypeHint::Int)));
        }
        let Some(arg) = args.first() else {
            return Err(self
                .ctx
                .validation(format!("{} needs a value to aggregate", kind.sql_name())));
        };

        let saved = self.scope.row;
        if let RowShape::Grouped { rows, .. } = saved {
            self.scope.row = rows;
        }
        let value = self.scalar(arg);
        self.scope.row = saved;
        let value = value?;

        let info = match kind {
            AggregateKind::Avg => ColumnInfo::hint(TypeHint::Float),
            _ => value.info,
        };
        Ok(Typed::atom(func(kind.sql_name(), vec![value.expr]), info))
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub(crate) fn binary_expr(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

pub(crate) fn and_all(parts: impl IntoIterator<Item = Expr>) -> Option<Expr> {
    parts
        .into_iter()
        .reduce(|acc, next| binary_expr(acc, BinaryOperator::And, next))
}

fn comparison_operator(op: BinaryOp) -> BinaryOperator {
    match op {
        BinaryOp::Eq => BinaryOperator::Eq,
        BinaryOp::Ne => BinaryOperator::Ne,
        BinaryOp::Lt => BinaryOperator::Lt,
        BinaryOp::Lte => BinaryOperator::Lte,
        BinaryOp::Gt => BinaryOperator::Gt,
        _ => BinaryOperator::Gte,
    }
}

/// `1 = 1` or `1 = 0`.
pub(crate) fn bool_constant(value: bool) -> Typed {
    Typed::predicate(
        binary_expr(
            Expr::Literal(Literal::Int(1)),
            BinaryOperator::Eq,
            Expr::Literal(Literal::Int(i64::from(value))),
        ),
        PREC_COMPARE,
    )
}

/// `member = TRUE` with the dialect's boolean literal.
fn compare_bool(typed: Typed, value: bool) -> Typed {
    Typed::predicate(
        binary_expr(
            typed.at_least(PREC_ADD),
            BinaryOperator::Eq,
            Expr::Literal(Literal::Bool(value)),
        ),
        PREC_COMPARE,
    )
}

/// `target.fk = owner.lk AND ..` for a navigation.
pub(crate) fn link_condition(
    ctx: &Context,
    owner_alias: &str,
    owner: &EntityMetadata,
    link: &ForeignKeyLink,
    target_alias: &str,
    target: &EntityMetadata,
) -> QuarryResult<Expr> {
    if link.local_keys.len() != link.foreign_keys.len() || link.local_keys.is_empty() {
        return Err(ctx.validation(format!(
            "navigation {}.{} declares mismatched key lists",
            owner.type_name, link.member
        )));
    }
    let mut parts = Vec::with_capacity(link.local_keys.len());
    for (local, foreign) in link.local_keys.iter().zip(&link.foreign_keys) {
        let local = owner.column(local).ok_or_else(|| {
            ctx.validation(format!("{} has no key column {}", owner.type_name, local))
        })?;
        let foreign = target.column(foreign).ok_or_else(|| {
            ctx.validation(format!("{} has no key column {}", target.type_name, foreign))
        })?;
        parts.push(binary_expr(
            Expr::Column {
                table: Some(target_alias.to_string()),
                column: foreign.name.clone(),
            },
            BinaryOperator::Eq,
            Expr::Column {
                table: Some(owner_alias.to_string()),
                column: local.name.clone(),
            },
        ));
    }
    // Non-empty, checked above
    Ok(and_all(parts).unwrap_or_else(|| Expr::Literal(Literal::Bool(true))))
}
