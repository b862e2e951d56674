//! Insert, update and delete compilation.
//!
//! Updates and deletes compile their source chain like a select, then pick a
//! statement form by what that chain produced:
//!
//! ```text
//!   no joins             UPDATE T SET .. WHERE ..            (aliases stripped)
//!   joins, JoinedFrom    UPDATE t0 SET .. FROM T AS t0 JOIN ..
//!   joins, JoinedTarget  UPDATE T AS t0 JOIN .. SET t0.c = ..
//!   joins, Correlated    UPDATE T SET .. WHERE EXISTS (SELECT 1 FROM T AS t0 JOIN ..
//!                                                      WHERE t0.k = T.k AND ..)
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::ast::{InsertSource, QueryNode, ScalarExpr};
use crate::command::{ColumnBinding, Command, Shape};
use crate::error::{QuarryError, QuarryResult};
use crate::metadata::{EntityMetadata, MetadataRegistry};
use crate::sql::{
    self, BinaryOperator, Delete, Expr, Insert, Literal, MutationStyle, SelectExpr,
    SqlDialect, Token, TokenStream, Update,
};
use crate::value::Value;

use super::alias::AliasRegistry;
use super::context::{ColumnInfo, Context, RowShape};
use super::select::{compile_chain, compile_rows, Level};
use super::visitor::{and_all, binary_expr, Scope, Visitor};
use super::CompileOptions;

/// Compile an insert, update or delete node.
pub(crate) fn compile_mutation(
    node: &QueryNode,
    registry: &Arc<MetadataRegistry>,
    options: CompileOptions,
) -> QuarryResult<Command> {
    let mut ctx = Context::new(options.dialect, options.parameterize, Arc::clone(registry));
    let command = match node {
        QueryNode::Insert {
            target,
            values: InsertSource::Values(values),
        } => insert_values(&mut ctx, target, values),
        QueryNode::Insert {
            target,
            values: InsertSource::Query(source),
        } => insert_rows(&mut ctx, target, source),
        QueryNode::Update { source, set } => {
            ctx.clause = "update";
            update(&mut ctx, source, set)
        }
        QueryNode::Delete { source } => {
            ctx.clause = "delete";
            delete(&mut ctx, source)
        }
        _ => Err(QuarryError::validation(
            node.clause(),
            "expected an insert, update or delete",
        )),
    }?;
    debug!(
        dialect = %options.dialect,
        params = command.params().len(),
        statement = node.clause(),
        "compiled mutation"
    );
    Ok(command)
}

// =============================================================================
// Insert
// =============================================================================

fn insert_values(
    ctx: &mut Context,
    target: &Arc<EntityMetadata>,
    values: &[(String, Value)],
) -> QuarryResult<Command> {
    ctx.clause = "insert";
    let dialect = ctx.dialect;
    let mut columns = Vec::with_capacity(values.len());
    let mut exprs = Vec::with_capacity(values.len());
    for (field, value) in values {
        let column = writable_column(ctx, target, field)?;
        columns.push(column.name.clone());
        exprs.push(ctx.constant(value.clone(), ColumnInfo::of(column))?.expr);
    }

    let mut insert = Insert::into(target.table_ref()).columns(columns).values(exprs);
    let (trailer, identity, bindings) = match target.identity_column() {
        Some(identity) => {
            let trailer = if dialect.supports_returning() {
                insert = insert.returning([identity.name.clone()]);
                None
            } else {
                dialect.identity_trailer()
            };
            let binding = ColumnBinding::field(&identity.name, &identity.field);
            (trailer, true, vec![binding])
        }
        None => (None, false, Vec::new()),
    };

    Ok(Command::new(
        dialect,
        insert.to_tokens(dialect),
        trailer,
        std::mem::take(&mut ctx.params),
        bindings,
        Vec::new(),
        Shape::Insert { identity },
    ))
}

fn insert_rows(
    ctx: &mut Context,
    target: &Arc<EntityMetadata>,
    source: &QueryNode,
) -> QuarryResult<Command> {
    let dialect = ctx.dialect;
    let (query, names) = compile_rows(ctx, AliasRegistry::new(), source)?;
    ctx.clause = "insert";
    let columns = names
        .iter()
        .map(|(name, _)| writable_column(ctx, target, name).map(|c| c.name.clone()))
        .collect::<QuarryResult<Vec<_>>>()?;
    if columns.is_empty() {
        return Err(ctx.validation("the source query selects no columns"));
    }

    let insert = Insert::into(target.table_ref())
        .columns(columns)
        .from_select(query);
    Ok(Command::new(
        dialect,
        insert.to_tokens(dialect),
        None,
        std::mem::take(&mut ctx.params),
        Vec::new(),
        Vec::new(),
        Shape::Mutation,
    ))
}

fn writable_column<'m>(
    ctx: &Context,
    target: &'m EntityMetadata,
    field: &str,
) -> QuarryResult<&'m crate::metadata::ColumnMeta> {
    let column = target
        .column(field)
        .ok_or_else(|| ctx.validation(format!("{} has no column {}", target.type_name, field)))?;
    if !column.is_writable() {
        return Err(ctx.validation(format!(
            "{}.{} is generated by the database and cannot be written",
            target.type_name, column.field
        )));
    }
    Ok(column)
}

// =============================================================================
// Update and delete
// =============================================================================

/// The compiled source chain of an update or delete.
struct Targeted {
    level: Level,
    alias: String,
    meta: Arc<EntityMetadata>,
}

fn target_rows(ctx: &mut Context, source: &QueryNode) -> QuarryResult<Targeted> {
    let clause = ctx.clause;
    let mut node = Some(source);
    while let Some(current) = node {
        match current {
            QueryNode::Source { .. }
            | QueryNode::Filter { .. }
            | QueryNode::Join { .. }
            | QueryNode::Include { .. } => {}
            other => {
                return Err(ctx.validation(format!(
                    "{} cannot precede an update or delete; only filters and joins can",
                    other.clause()
                )))
            }
        }
        node = current.source().map(|s| &**s);
    }

    let mut level = Level::new(AliasRegistry::new());
    compile_chain(ctx, &mut level, source)?;
    ctx.clause = clause;

    let RowShape::Entity { alias, meta } = level.row.clone() else {
        return Err(ctx.validation("an update or delete needs the rows of one table"));
    };
    if !meta.has_key() {
        return Err(ctx.validation(format!(
            "{} has no key column and cannot be updated or deleted",
            meta.type_name
        )));
    }
    Ok(Targeted { level, alias, meta })
}

fn update(ctx: &mut Context, source: &QueryNode, set: &[(String, ScalarExpr)]) -> QuarryResult<Command> {
    let Targeted {
        mut level,
        alias,
        meta,
    } = target_rows(ctx, source)?;
    if set.is_empty() {
        return Err(ctx.validation("nothing to update"));
    }

    let mut assignments = Vec::with_capacity(set.len());
    for (field, value) in set {
        let column = writable_column(ctx, &meta, field)?;
        let name = column.name.clone();
        let info = ColumnInfo::of(column);
        let typed = Visitor {
            ctx: &mut *ctx,
            joins: &mut level.joins,
            aliases: &mut level.aliases,
            scope: Scope {
                row: &level.row,
                sources: &level.sources,
            },
        }
        .value_with(value, info)?;
        assignments.push((name, typed.expr));
    }

    let dialect = ctx.dialect;
    let filter = level.filter.take().map(|t| t.expr);
    let mut statement = Update::table(meta.table_ref());

    if level.joins.is_empty() {
        for (column, expr) in assignments {
            statement = statement.set(column, strip_alias(expr, &alias));
        }
        if let Some(filter) = filter {
            statement = statement.filter(strip_alias(filter, &alias));
        }
    } else {
        match dialect.mutation_style() {
            MutationStyle::JoinedFrom | MutationStyle::JoinedTarget => {
                for (column, expr) in assignments {
                    statement = statement.set(column, expr);
                }
                statement = statement.joined(&alias, std::mem::take(&mut level.joins));
                if let Some(filter) = filter {
                    statement = statement.filter(filter);
                }
            }
            MutationStyle::Correlated => {
                for (column, expr) in assignments {
                    let expr = strip_alias(expr, &alias);
                    if reads_other_table(&expr) {
                        return Err(QuarryError::translation(
                            "update values reading joined sources",
                            dialect,
                        ));
                    }
                    statement = statement.set(column, expr);
                }
                statement =
                    statement.filter(correlated_exists(&meta, &alias, level.from.take(), level.joins, filter));
            }
        }
    }

    Ok(Command::new(
        dialect,
        statement.to_tokens(dialect),
        None,
        std::mem::take(&mut ctx.params),
        Vec::new(),
        Vec::new(),
        Shape::Mutation,
    ))
}

fn delete(ctx: &mut Context, source: &QueryNode) -> QuarryResult<Command> {
    let Targeted {
        mut level,
        alias,
        meta,
    } = target_rows(ctx, source)?;
    let dialect = ctx.dialect;
    let filter = level.filter.take().map(|t| t.expr);
    let mut statement = Delete::from(meta.table_ref());

    if level.joins.is_empty() {
        if let Some(filter) = filter {
            statement = statement.filter(strip_alias(filter, &alias));
        }
    } else {
        match dialect.mutation_style() {
            MutationStyle::JoinedFrom | MutationStyle::JoinedTarget => {
                statement = statement.joined(&alias, std::mem::take(&mut level.joins));
                if let Some(filter) = filter {
                    statement = statement.filter(filter);
                }
            }
            MutationStyle::Correlated => {
                statement =
                    statement.filter(correlated_exists(&meta, &alias, level.from.take(), level.joins, filter));
            }
        }
    }

    Ok(Command::new(
        dialect,
        statement.to_tokens(dialect),
        None,
        std::mem::take(&mut ctx.params),
        Vec::new(),
        Vec::new(),
        Shape::Mutation,
    ))
}

/// `EXISTS (SELECT 1 FROM T AS t0 JOIN .. WHERE t0.k = T.k AND ..)`
fn correlated_exists(
    meta: &EntityMetadata,
    alias: &str,
    from: Option<sql::FromSource>,
    joins: Vec<sql::Join>,
    filter: Option<Expr>,
) -> Expr {
    let keys = meta.key_columns().map(|k| {
        binary_expr(
            Expr::Column {
                table: Some(alias.to_string()),
                column: k.name.clone(),
            },
            BinaryOperator::Eq,
            Expr::Column {
                table: Some(meta.table.clone()),
                column: k.name.clone(),
            },
        )
    });
    let condition = and_all(keys.chain(filter.map(|f| Expr::Paren(Box::new(f)))));

    let mut query = sql::Query::new();
    query.select = vec![SelectExpr::new(Expr::Literal(Literal::Int(1)))];
    query.from = from;
    query.joins = joins;
    query.where_clause = condition;
    Expr::Exists(Box::new(query))
}

/// Drop the qualifier `alias` from column references.
fn strip_alias(expr: Expr, alias: &str) -> Expr {
    let strip = |e: Box<Expr>| Box::new(strip_alias(*e, alias));
    match expr {
        Expr::Column {
            table: Some(table),
            column,
        } if table == alias => Expr::Column {
            table: None,
            column,
        },
        Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
            left: strip(left),
            op,
            right: strip(right),
        },
        Expr::UnaryOp { op, expr } => Expr::UnaryOp { op, expr: strip(expr) },
        Expr::Function {
            name,
            args,
            distinct,
        } => Expr::Function {
            name,
            args: args.into_iter().map(|a| strip_alias(a, alias)).collect(),
            distinct,
        },
        Expr::Case {
            operand,
            when_clauses,
            else_clause,
        } => Expr::Case {
            operand: operand.map(strip),
            when_clauses: when_clauses
                .into_iter()
                .map(|(w, t)| (strip_alias(w, alias), strip_alias(t, alias)))
                .collect(),
            else_clause: else_clause.map(strip),
        },
        Expr::In {
            expr,
            values,
            negated,
        } => Expr::In {
            expr: strip(expr),
            values: values.into_iter().map(|v| strip_alias(v, alias)).collect(),
            negated,
        },
        Expr::IsNull { expr, negated } => Expr::IsNull {
            expr: strip(expr),
            negated,
        },
        Expr::LikeEscape {
            expr,
            pattern,
            escape_char,
            negated,
        } => Expr::LikeEscape {
            expr: strip(expr),
            pattern: strip(pattern),
            escape_char,
            negated,
        },
        Expr::Cast { expr, type_name } => Expr::Cast {
            expr: strip(expr),
            type_name,
        },
        Expr::Paren(inner) => Expr::Paren(strip(inner)),
        Expr::Fragment(tokens) => Expr::Fragment(strip_tokens(&tokens, alias)),
        other => other,
    }
}

/// Remove `alias.` prefixes from a pre-rendered fragment.
fn strip_tokens(tokens: &TokenStream, alias: &str) -> TokenStream {
    let mut out = TokenStream::new();
    let mut iter = tokens.tokens().iter().peekable();
    while let Some(token) = iter.next() {
        if matches!(token, Token::Ident(name) if name == alias) && iter.peek() == Some(&&Token::Dot) {
            iter.next();
            continue;
        }
        out.push(token.clone());
    }
    out
}

/// Whether a column of some other alias is still referenced.
fn reads_other_table(expr: &Expr) -> bool {
    match expr {
        Expr::Column { table, .. } => table.is_some(),
        Expr::BinaryOp { left, right, .. } => reads_other_table(left) || reads_other_table(right),
        Expr::UnaryOp { expr, .. }
        | Expr::IsNull { expr, .. }
        | Expr::Cast { expr, .. }
        | Expr::Paren(expr) => reads_other_table(expr),
        Expr::Function { args, .. } => args.iter().any(reads_other_table),
        Expr::Case {
            operand,
            when_clauses,
            else_clause,
        } => {
            operand.as_deref().is_some_and(reads_other_table)
                || when_clauses
                    .iter()
                    .any(|(w, t)| reads_other_table(w) || reads_other_table(t))
                || else_clause.as_deref().is_some_and(reads_other_table)
        }
        Expr::In { expr, values, .. } => {
            reads_other_table(expr) || values.iter().any(reads_other_table)
        }
        Expr::LikeEscape { expr, pattern, .. } => reads_other_table(expr) || reads_other_table(pattern),
        Expr::Fragment(tokens) => tokens.tokens().iter().any(|t| matches!(t, Token::Dot)),
        _ => false,
    }
}
