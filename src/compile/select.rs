//! Select compilation.
//!
//! A node chain is folded, innermost first, into [`Level`]s: one level is one
//! `SELECT`. Each node either lands in the current level or, when the level
//! already holds a clause the node would change the meaning of, closes the
//! level into a derived table and starts a new one around it:
//!
//! ```text
//!   Orders.order_by(Date).take(5).count()
//!
//!   level 0  SELECT TOP (5) t0.* FROM Orders t0 ORDER BY t0.Date
//!   level 1  SELECT COUNT(*) FROM (level 0) AS t1
//! ```
//!
//! | Node      | Nests when the level is                        |
//! |-----------|------------------------------------------------|
//! | filter    | paged, distinct, or a union                    |
//! | project   | distinct, or a union                           |
//! | join      | grouped, projected, distinct, paged, or a union |
//! | group_by  | grouped, paged, distinct, or a union           |
//! | order_by  | paged, distinct, or a union                    |
//! | aggregate | grouped, paged, distinct, or a union           |
//! | distinct  | paged, or a union                              |
//! | union     | ordered or paged (either branch)               |
//!
//! Orderings survive nesting: ordering keys the derived table exposes are
//! re-read from it, anything else travels as a hidden `__o` column.

use std::sync::Arc;

use tracing::debug;

use crate::ast::{AggregateKind, JoinKind, QueryNode, ScalarExpr, SortDirection};
use crate::command::{ColumnBinding, Command, NavigationDescriptor, Shape};
use crate::error::QuarryResult;
use crate::metadata::{EntityMetadata, MetadataRegistry};
use crate::sql::{
    self, Expr, FromSource, Join, JoinType, Literal, OrderByExpr, SelectExpr, SqlDialect,
};
use crate::value::{TypeHint, Value};

use super::alias::{AliasRegistry, SourceKey};
use super::context::{ColumnInfo, Context, Member, RowShape, Typed, PREC_ADD, PREC_AND};
use super::visitor::{and_all, binary_expr, link_condition, Scope, Visitor};
use super::CompileOptions;

/// How a level ends when nothing may follow it.
#[derive(Debug)]
enum Terminal {
    /// A single aggregate value.
    Aggregate(SelectExpr),
    /// An existence check.
    Exists,
}

/// One `SELECT` under construction.
pub(crate) struct Level {
    pub aliases: AliasRegistry,
    pub from: Option<FromSource>,
    pub joins: Vec<Join>,
    pub filter: Option<Typed>,
    pub group_by: Vec<Expr>,
    pub having: Option<Typed>,
    pub order_by: Vec<(Expr, SortDirection)>,
    pub distinct: bool,
    pub skip: Option<i64>,
    pub take: Option<i64>,
    pub unions: Vec<sql::Query>,
    pub row: RowShape,
    /// Rows of joined sources by binding name.
    pub sources: Vec<(String, RowShape)>,
    projected: bool,
    target: Option<Arc<EntityMetadata>>,
    terminal: Option<Terminal>,
    /// Levels nested below this one.
    depth: usize,
}

impl Level {
    pub fn new(aliases: AliasRegistry) -> Self {
        Self {
            aliases,
            from: None,
            joins: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            distinct: false,
            skip: None,
            take: None,
            unions: Vec::new(),
            row: RowShape::Scalar,
            sources: Vec::new(),
            projected: false,
            target: None,
            terminal: None,
            depth: 0,
        }
    }

    fn is_paged(&self) -> bool {
        self.skip.is_some() || self.take.is_some()
    }

    fn is_grouped(&self) -> bool {
        !self.group_by.is_empty() || matches!(self.row, RowShape::Grouped { .. })
    }

    fn has_union(&self) -> bool {
        !self.unions.is_empty()
    }
}

/// A visitor over the rows of `level`.
fn visit<'a>(ctx: &'a mut Context, level: &'a mut Level) -> Visitor<'a, 'a> {
    let Level {
        aliases,
        joins,
        row,
        sources,
        ..
    } = level;
    Visitor {
        ctx,
        joins,
        aliases,
        scope: Scope { row, sources },
    }
}

fn column(table: &str, name: &str) -> Expr {
    Expr::Column {
        table: Some(table.to_string()),
        column: name.to_string(),
    }
}

fn and_typed(existing: Option<Typed>, next: Typed) -> Typed {
    match existing {
        None => next,
        Some(prev) => Typed::predicate(
            binary_expr(
                prev.at_least(PREC_AND),
                sql::BinaryOperator::And,
                next.at_least(PREC_AND),
            ),
            PREC_AND,
        ),
    }
}

// =============================================================================
// Entry points
// =============================================================================

/// Compile a select chain into a command.
pub(crate) fn compile_select(
    node: &QueryNode,
    registry: &Arc<MetadataRegistry>,
    options: CompileOptions,
) -> QuarryResult<Command> {
    let mut ctx = Context::new(options.dialect, options.parameterize, Arc::clone(registry));
    let mut level = Level::new(AliasRegistry::new());
    compile_chain(&mut ctx, &mut level, node)?;

    ctx.clause = "include";
    let depth = level.depth;
    let finished = finish(&mut ctx, level, &node.includes())?;

    let dialect = options.dialect;
    let mut tokens = finished.query.to_tokens_for_dialect(dialect);
    if matches!(finished.shape, Shape::Exists) {
        tokens = dialect.emit_exists_check(&tokens);
    }

    debug!(
        dialect = %dialect,
        params = ctx.params.len(),
        levels = depth + 1,
        navigations = finished.navigations.len(),
        "compiled query"
    );

    Ok(Command::new(
        dialect,
        tokens,
        None,
        ctx.params,
        finished.columns,
        finished.navigations,
        finished.shape,
    ))
}

/// Compile a chain used as the row source of an `INSERT .. SELECT`: the
/// select and the names of its columns.
pub(crate) fn compile_rows(
    ctx: &mut Context,
    aliases: AliasRegistry,
    node: &QueryNode,
) -> QuarryResult<(sql::Query, Vec<(String, ColumnInfo)>)> {
    let mut level = Level::new(aliases);
    compile_chain(ctx, &mut level, node)?;
    if level.terminal.is_some() {
        return Err(ctx.validation("an aggregate or existence check cannot supply rows"));
    }
    let exposed = exposed_columns(ctx, &level)?;
    let select = exposed.iter().map(|c| select_expr(c.expr.clone(), &c.name)).collect();
    let names = exposed.into_iter().map(|c| (c.name, c.info)).collect();
    let keep_order = level.is_paged();
    let query = build_query(ctx, level, select, keep_order)?;
    Ok((query, names))
}

/// Fold `node` and its predecessors into `level`.
pub(crate) fn compile_chain(ctx: &mut Context, level: &mut Level, node: &QueryNode) -> QuarryResult<()> {
    if let Some(source) = node.source() {
        compile_chain(ctx, level, source)?;
    }
    ctx.clause = node.clause();
    if level.terminal.is_some() {
        return Err(ctx.validation("nothing can follow an aggregate or existence check"));
    }
    apply(ctx, level, node)
}

fn apply(ctx: &mut Context, level: &mut Level, node: &QueryNode) -> QuarryResult<()> {
    match node {
        QueryNode::Source { entity } => {
            let alias = level.aliases.fresh();
            level
                .aliases
                .preassign(SourceKey::Table(entity.table.clone()), &alias);
            level.from = Some(FromSource::Table(entity.table_ref().with_alias(&alias)));
            level.row = RowShape::Entity {
                alias,
                meta: Arc::clone(entity),
            };
            Ok(())
        }
        QueryNode::Filter { predicate, .. } => apply_filter(ctx, level, predicate),
        QueryNode::Project {
            selector, target, ..
        } => {
            if level.distinct || level.has_union() {
                nest(ctx, level)?;
            }
            let members = visit(ctx, level).members(selector)?;
            for (i, member) in members.iter().enumerate() {
                if members[..i].iter().any(|m| m.name == member.name) {
                    return Err(ctx.validation(format!("member {} is selected twice", member.name)));
                }
            }
            level.row = RowShape::Members(members);
            level.projected = true;
            level.target = target.clone();
            Ok(())
        }
        QueryNode::Join {
            kind,
            inner,
            binding,
            on_left,
            on_right,
            ..
        } => apply_join(ctx, level, *kind, inner, binding, on_left.as_ref(), on_right.as_ref()),
        QueryNode::GroupBy { key, .. } => {
            if level.is_paged() || level.distinct || level.is_grouped() || level.has_union() {
                nest(ctx, level)?;
            }
            let composite = matches!(key, ScalarExpr::NewObject(_) | ScalarExpr::MemberInit { .. });
            let members = visit(ctx, level).members(key)?;
            level.group_by = members.iter().map(|m| m.value.expr.clone()).collect();
            level.order_by.clear();
            let rows = std::mem::replace(&mut level.row, RowShape::Scalar);
            level.row = RowShape::Grouped {
                key: members,
                composite,
                rows: Box::new(rows),
            };
            Ok(())
        }
        QueryNode::OrderBy {
            key,
            direction,
            then,
            ..
        } => {
            if *then {
                if level.order_by.is_empty() || level.is_paged() {
                    return Err(ctx.validation("then_by requires a preceding order_by"));
                }
            } else {
                if level.is_paged() || level.distinct || level.has_union() {
                    nest(ctx, level)?;
                }
                level.order_by.clear();
            }
            let members = visit(ctx, level).members(key)?;
            level
                .order_by
                .extend(members.into_iter().map(|m| (m.value.expr, *direction)));
            Ok(())
        }
        QueryNode::Skip { count, .. } => {
            if *count < 0 {
                return Err(ctx.validation(format!("cannot skip a negative number of rows ({count})")));
            }
            if level.order_by.is_empty() {
                return Err(ctx.validation("requires a preceding order_by"));
            }
            let skip = level
                .skip
                .unwrap_or(0)
                .checked_add(*count)
                .ok_or_else(|| ctx.validation("total rows skipped exceeds the 64-bit range"))?;
            level.skip = Some(skip);
            level.take = level.take.map(|t| (t - count).max(0));
            Ok(())
        }
        QueryNode::Take { count, .. } => {
            if *count < 0 {
                return Err(ctx.validation(format!("cannot take a negative number of rows ({count})")));
            }
            level.take = Some(level.take.map_or(*count, |t| t.min(*count)));
            Ok(())
        }
        QueryNode::Aggregate { kind, selector, .. } => {
            if level.distinct || level.is_grouped() || level.is_paged() || level.has_union() {
                nest(ctx, level)?;
            }
            let value = match (kind, selector) {
                (AggregateKind::Count, _) => {
                    Typed::atom(sql::expr::count_star(), ColumnInfo::hint(TypeHint::Int))
                }
                (kind, Some(selector)) => {
                    let call = ScalarExpr::Call {
                        function: crate::ast::Function::Aggregate(*kind),
                        args: vec![selector.clone()],
                    };
                    visit(ctx, level).scalar(&call)?
                }
                (kind, None) => {
                    return Err(ctx.validation(format!("{} needs a selector", kind.sql_name())));
                }
            };
            level.order_by.clear();
            level.row = RowShape::Scalar;
            level.terminal = Some(Terminal::Aggregate(
                SelectExpr::new(value.expr).with_alias("Value"),
            ));
            Ok(())
        }
        QueryNode::Distinct { .. } => {
            if level.is_paged() || level.has_union() {
                nest(ctx, level)?;
            }
            // Rows of a distinct level can only be ordered by what they select
            let exposed = exposed_columns(ctx, level)?;
            let before = level.order_by.len();
            level
                .order_by
                .retain(|(expr, _)| exposed.iter().any(|c| c.expr == *expr));
            if level.order_by.len() < before {
                debug!(dropped = before - level.order_by.len(), "distinct drops unselected orderings");
            }
            level.distinct = true;
            Ok(())
        }
        QueryNode::Union { other, .. } => apply_union(ctx, level, other),
        QueryNode::Any { predicate, .. } => {
            if let Some(predicate) = predicate {
                apply_filter(ctx, level, predicate)?;
            }
            if level.has_union() {
                nest(ctx, level)?;
            }
            if !level.is_paged() {
                level.order_by.clear();
            }
            level.terminal = Some(Terminal::Exists);
            Ok(())
        }
        QueryNode::Include { .. } => Ok(()),
        QueryNode::Insert { .. } | QueryNode::Update { .. } | QueryNode::Delete { .. } => {
            Err(ctx.validation("a mutation cannot be used as a query source"))
        }
    }
}

fn apply_filter(ctx: &mut Context, level: &mut Level, predicate: &ScalarExpr) -> QuarryResult<()> {
    if level.is_paged() || level.distinct || level.has_union() {
        nest(ctx, level)?;
    }
    let condition = visit(ctx, level).predicate(predicate)?;
    if level.group_by.is_empty() {
        level.filter = Some(and_typed(level.filter.take(), condition));
    } else {
        level.having = Some(and_typed(level.having.take(), condition));
    }
    Ok(())
}

fn apply_join(
    ctx: &mut Context,
    level: &mut Level,
    kind: JoinKind,
    inner: &QueryNode,
    binding: &str,
    on_left: Option<&ScalarExpr>,
    on_right: Option<&ScalarExpr>,
) -> QuarryResult<()> {
    if level.is_grouped() || level.projected || level.distinct || level.is_paged() || level.has_union() {
        nest(ctx, level)?;
    }
    if level.sources.iter().any(|(name, _)| name == binding) {
        return Err(ctx.validation(format!("source {binding} is joined twice")));
    }

    let clause = ctx.clause;
    let (source, inner_row) = join_source(ctx, level, inner)?;
    ctx.clause = clause;

    let on = match (kind, on_left, on_right) {
        (JoinKind::Cross, _, _) => None,
        (_, Some(left), Some(right)) => {
            let left = visit(ctx, level).members(left)?;
            let mut trailing = Vec::new();
            let right = Visitor {
                ctx: &mut *ctx,
                joins: &mut trailing,
                aliases: &mut level.aliases,
                scope: Scope {
                    row: &inner_row,
                    sources: &level.sources,
                },
            }
            .members(right)?;
            if !trailing.is_empty() {
                return Err(ctx.validation(
                    "join keys of the inner source cannot traverse navigations; project them first",
                ));
            }
            if left.len() != right.len() {
                return Err(ctx.validation("outer and inner join keys have different member counts"));
            }
            let parts = left.into_iter().zip(right).map(|(l, r)| {
                binary_expr(
                    l.value.at_least(PREC_ADD),
                    sql::BinaryOperator::Eq,
                    r.value.at_least(PREC_ADD),
                )
            });
            and_all(parts)
        }
        _ => return Err(ctx.validation("join keys are missing")),
    };

    let join_type = match kind {
        JoinKind::Inner => JoinType::Inner,
        JoinKind::Left => JoinType::Left,
        JoinKind::Right => JoinType::Right,
        JoinKind::Cross => JoinType::Cross,
    };
    level.joins.push(Join {
        join_type,
        source,
        on,
    });
    level.sources.push((binding.to_string(), inner_row));
    Ok(())
}

/// The inner side of a join: a table, or a nested select with its own alias.
fn join_source(
    ctx: &mut Context,
    level: &mut Level,
    inner: &QueryNode,
) -> QuarryResult<(FromSource, RowShape)> {
    if let QueryNode::Source { entity } = inner {
        let alias = level.aliases.fresh();
        return Ok((
            FromSource::Table(entity.table_ref().with_alias(&alias)),
            RowShape::Entity {
                alias,
                meta: Arc::clone(entity),
            },
        ));
    }

    let mut child = Level::new(level.aliases.spawn_child());
    compile_chain(ctx, &mut child, inner)?;
    if child.terminal.is_some() {
        return Err(ctx.validation("an aggregate or existence check cannot be joined"));
    }
    let alias = child.aliases.fresh();
    let derived = derive(ctx, child, &alias)?;
    Ok((derived.source, derived.row))
}

fn apply_union(ctx: &mut Context, level: &mut Level, other: &QueryNode) -> QuarryResult<()> {
    let clause = ctx.clause;
    let mut branch = Level::new(level.aliases.spawn_child());
    compile_chain(ctx, &mut branch, other)?;
    ctx.clause = clause;
    if branch.terminal.is_some() {
        return Err(ctx.validation("an aggregate or existence check cannot be a union branch"));
    }
    if branch.is_paged() {
        nest(ctx, &mut branch)?;
    }
    branch.order_by.clear();

    if level.is_paged() {
        nest(ctx, level)?;
    }
    level.order_by.clear();

    let exposed = exposed_columns(ctx, &branch)?;
    let expected = exposed_columns(ctx, level)?.len();
    if exposed.len() != expected {
        return Err(ctx.validation(format!(
            "union branches select {} and {} columns",
            expected,
            exposed.len()
        )));
    }
    let select = exposed.iter().map(|c| select_expr(c.expr.clone(), &c.name)).collect();
    let query = build_query(ctx, branch, select, false)?;
    level.unions.push(query);
    Ok(())
}

// =============================================================================
// Nesting
// =============================================================================

/// A column a level exposes to the level around it.
struct Exposed {
    expr: Expr,
    name: String,
    info: ColumnInfo,
}

fn member_columns(members: &[Member]) -> Vec<Exposed> {
    members
        .iter()
        .map(|m| Exposed {
            expr: m.value.expr.clone(),
            name: m.name.clone(),
            info: m.value.info,
        })
        .collect()
}

fn exposed_columns(ctx: &Context, level: &Level) -> QuarryResult<Vec<Exposed>> {
    match &level.row {
        RowShape::Entity { alias, meta } => Ok(meta
            .columns
            .iter()
            .map(|c| Exposed {
                expr: column(alias, &c.name),
                name: c.name.clone(),
                info: ColumnInfo::of(c),
            })
            .collect()),
        RowShape::Members(m) => Ok(member_columns(m)),
        // An unprojected grouping exposes its key
        RowShape::Grouped { key, .. } => Ok(member_columns(key)),
        RowShape::Scalar => Err(ctx.validation("an aggregate result cannot be used as a row source")),
    }
}

/// `expr AS name`, leaving plain columns of the same name unaliased.
fn select_expr(expr: Expr, name: &str) -> SelectExpr {
    match &expr {
        Expr::Column { column, .. } if column == name => SelectExpr::new(expr),
        _ => SelectExpr::new(expr).with_alias(name),
    }
}

struct Derived {
    source: FromSource,
    row: RowShape,
    order_by: Vec<(Expr, SortDirection)>,
    target: Option<Arc<EntityMetadata>>,
}

/// Close `level` into a derived table aliased `alias`.
fn derive(ctx: &mut Context, level: Level, alias: &str) -> QuarryResult<Derived> {
    let exposed = exposed_columns(ctx, &level)?;
    let mut select: Vec<SelectExpr> = exposed
        .iter()
        .map(|c| select_expr(c.expr.clone(), &c.name))
        .collect();

    let mut order_by = Vec::with_capacity(level.order_by.len());
    for (expr, direction) in &level.order_by {
        let name = match exposed.iter().find(|c| c.expr == *expr) {
            Some(c) => c.name.clone(),
            None if level.distinct => {
                return Err(ctx.validation("ordering of a distinct query must use selected members"));
            }
            None => {
                let name = ctx.hidden_name('o');
                select.push(SelectExpr::new(expr.clone()).with_alias(&name));
                name
            }
        };
        order_by.push((column(alias, &name), *direction));
    }

    let row = match &level.row {
        RowShape::Entity { meta, .. } => RowShape::Entity {
            alias: alias.to_string(),
            meta: Arc::clone(meta),
        },
        _ => RowShape::Members(
            exposed
                .into_iter()
                .map(|c| Member {
                    value: Typed::atom(column(alias, &c.name), c.info),
                    name: c.name,
                })
                .collect(),
        ),
    };

    let target = level.target.clone();
    let keep_order = level.is_paged();
    let query = build_query(ctx, level, select, keep_order)?;
    Ok(Derived {
        source: FromSource::derived(query, alias),
        row,
        order_by,
        target,
    })
}

/// Replace `level` with a new level selecting from it.
fn nest(ctx: &mut Context, level: &mut Level) -> QuarryResult<()> {
    let alias = level.aliases.fresh();
    let mut outer = Level::new(level.aliases.spawn_child());
    outer.depth = level.depth + 1;
    let inner = std::mem::replace(level, outer);
    let derived = derive(ctx, inner, &alias)?;
    level.from = Some(derived.source);
    level.row = derived.row;
    level.order_by = derived.order_by;
    level.target = derived.target;
    Ok(())
}

/// Render a level with the given select list.
fn build_query(
    ctx: &mut Context,
    level: Level,
    select: Vec<SelectExpr>,
    keep_order: bool,
) -> QuarryResult<sql::Query> {
    let int = ColumnInfo::hint(TypeHint::Int);
    // Offset first so markers read in text order on OFFSET .. FETCH dialects
    let offset = match level.skip {
        Some(n) => Some(ctx.constant(Value::Int(n), int)?.expr),
        None => None,
    };
    let limit = match level.take {
        Some(n) => Some(ctx.constant(Value::Int(n), int)?.expr),
        None => None,
    };

    let mut query = sql::Query::new();
    query.select = select;
    query.distinct = level.distinct;
    query.from = level.from;
    query.joins = level.joins;
    query.where_clause = level.filter.map(|t| t.expr);
    query.group_by = level.group_by;
    query.having = level.having.map(|t| t.expr);
    if keep_order {
        query.order_by = level
            .order_by
            .into_iter()
            .map(|(expr, direction)| match direction {
                SortDirection::Ascending => OrderByExpr::asc(expr),
                SortDirection::Descending => OrderByExpr::desc(expr),
            })
            .collect();
    }
    if offset.is_some() || limit.is_some() {
        query.limit_offset = Some(sql::LimitOffset { limit, offset });
    }
    query.union_all = level.unions;
    Ok(query)
}

// =============================================================================
// Final select list and includes
// =============================================================================

struct Finished {
    query: sql::Query,
    columns: Vec<ColumnBinding>,
    navigations: Vec<NavigationDescriptor>,
    shape: Shape,
}

fn finish(
    ctx: &mut Context,
    mut level: Level,
    includes: &[(&str, Option<&ScalarExpr>)],
) -> QuarryResult<Finished> {
    match level.terminal.take() {
        Some(Terminal::Exists) => {
            let select = vec![SelectExpr::new(Expr::Literal(Literal::Int(1)))];
            let keep_order = level.is_paged();
            let query = build_query(ctx, level, select, keep_order)?;
            return Ok(Finished {
                query,
                columns: Vec::new(),
                navigations: Vec::new(),
                shape: Shape::Exists,
            });
        }
        Some(Terminal::Aggregate(select)) => {
            let query = build_query(ctx, level, vec![select], false)?;
            return Ok(Finished {
                query,
                columns: vec![ColumnBinding::nav("Value".into())],
                navigations: Vec::new(),
                shape: Shape::Scalar,
            });
        }
        None => {}
    }

    if matches!(level.row, RowShape::Entity { .. }) {
        return finish_entity(ctx, level, includes);
    }
    let members = match &level.row {
        RowShape::Members(members) => members.clone(),
        RowShape::Grouped { .. } => {
            return Err(ctx.validation(
                "project a grouped query with key() and aggregates before reading it",
            ))
        }
        _ => return Err(ctx.validation("the query has no rows to read")),
    };

    if !includes.is_empty() {
        return Err(ctx.validation(
            "navigations cannot be included once rows are projected; include before project",
        ));
    }
    let select = members
        .iter()
        .map(|m| select_expr(m.value.expr.clone(), &m.name))
        .collect();
    let columns = members
        .iter()
        .map(|m| ColumnBinding::field(&m.name, &m.name))
        .collect();
    let shape = match &level.target {
        Some(target) => Shape::Entity(Arc::clone(target)),
        None => Shape::Members,
    };
    let query = build_query(ctx, level, select, true)?;
    Ok(Finished {
        query,
        columns,
        navigations: Vec::new(),
        shape,
    })
}

/// A node of the include tree.
struct IncludeNode<'q> {
    path: String,
    member: String,
    filter: Option<&'q ScalarExpr>,
    children: Vec<IncludeNode<'q>>,
}

fn include_tree<'q>(includes: &[(&'q str, Option<&'q ScalarExpr>)]) -> Vec<IncludeNode<'q>> {
    let mut roots: Vec<IncludeNode<'q>> = Vec::new();
    for (path, filter) in includes {
        let segments: Vec<&str> = path.split('.').collect();
        let mut siblings = &mut roots;
        for (depth, segment) in segments.iter().enumerate() {
            let position = match siblings.iter().position(|n| n.member == *segment) {
                Some(position) => position,
                None => {
                    siblings.push(IncludeNode {
                        path: segments[..=depth].join("."),
                        member: segment.to_string(),
                        filter: None,
                        children: Vec::new(),
                    });
                    siblings.len() - 1
                }
            };
            if depth + 1 == segments.len() && filter.is_some() {
                siblings[position].filter = *filter;
            }
            siblings = &mut siblings[position].children;
        }
    }
    roots
}

/// Output of the final select: columns in order plus their bindings.
#[derive(Default)]
struct Projection {
    select: Vec<SelectExpr>,
    columns: Vec<ColumnBinding>,
    navigations: Vec<NavigationDescriptor>,
}

fn finish_entity(
    ctx: &mut Context,
    mut level: Level,
    includes: &[(&str, Option<&ScalarExpr>)],
) -> QuarryResult<Finished> {
    let tree = include_tree(includes);
    let root_meta = match &level.row {
        RowShape::Entity { meta, .. } => Arc::clone(meta),
        _ => return Err(ctx.validation("the query has no entity rows")),
    };

    let has_collection = tree
        .iter()
        .any(|node| root_meta.link(&node.member).is_some_and(|l| l.is_collection));
    // Collections join outside the paged parent rows; unions need every
    // branch to keep the same columns.
    if has_collection || (!tree.is_empty() && level.has_union()) {
        nest(ctx, &mut level)?;
    }

    let RowShape::Entity { alias, meta } = level.row.clone() else {
        return Err(ctx.validation("the query has no entity rows"));
    };

    let mut out = Projection::default();
    for c in &meta.columns {
        out.select.push(SelectExpr::new(column(&alias, &c.name)));
        out.columns.push(ColumnBinding::field(&c.name, &c.field));
    }

    let mut child_keys = Vec::new();
    for node in &tree {
        emit_include(ctx, &mut level, node, &alias, &meta, None, &mut out, &mut child_keys)?;
    }

    if has_collection {
        if !meta.has_key() {
            return Err(ctx.validation(format!(
                "{} needs a key column to include a collection",
                meta.type_name
            )));
        }
        for key in meta.key_columns() {
            level
                .order_by
                .push((column(&alias, &key.name), SortDirection::Ascending));
        }
        level.order_by.extend(
            child_keys
                .into_iter()
                .map(|expr| (expr, SortDirection::Ascending)),
        );
    }

    let query = build_query(ctx, level, out.select, true)?;
    Ok(Finished {
        query,
        columns: out.columns,
        navigations: out.navigations,
        shape: Shape::Entity(meta),
    })
}

/// Join one included navigation and its children, pre-order.
#[allow(clippy::too_many_arguments)]
fn emit_include(
    ctx: &mut Context,
    level: &mut Level,
    node: &IncludeNode<'_>,
    owner_alias: &str,
    owner: &Arc<EntityMetadata>,
    parent: Option<usize>,
    out: &mut Projection,
    child_keys: &mut Vec<Expr>,
) -> QuarryResult<()> {
    let link = owner.link(&node.member).ok_or_else(|| {
        ctx.validation(format!("{} has no navigation named {}", owner.type_name, node.member))
    })?;
    let target = link.target_metadata(&ctx.registry);

    let key = SourceKey::Navigation(format!("{owner_alias}.{}", link.member));
    let (alias, is_new) = match node.filter {
        // A filtered include needs a join of its own
        Some(_) => (level.aliases.fresh(), true),
        None => level.aliases.resolve(key),
    };

    if is_new {
        let mut on = link_condition(ctx, owner_alias, owner, link, &alias, &target)?;
        if let Some(filter) = node.filter {
            let row = RowShape::Entity {
                alias: alias.clone(),
                meta: Arc::clone(&target),
            };
            let mut extra = Vec::new();
            let condition = Visitor {
                ctx: &mut *ctx,
                joins: &mut extra,
                aliases: &mut level.aliases,
                scope: Scope {
                    row: &row,
                    sources: &[],
                },
            }
            .predicate(filter)?;
            if !extra.is_empty() {
                return Err(ctx.validation(format!(
                    "the filter of {} can only read columns of {}",
                    node.path, target.type_name
                )));
            }
            on = and_typed(Some(Typed::predicate(on, PREC_AND)), condition).expr;
        }
        level.joins.push(Join {
            join_type: JoinType::Left,
            source: FromSource::Table(target.table_ref().with_alias(&alias)),
            on: Some(on),
        });
    }

    let start = out.columns.len();
    for c in &target.columns {
        let name = format!("{alias}_{}", c.name);
        out.select
            .push(SelectExpr::new(column(&alias, &c.name)).with_alias(&name));
        out.columns.push(ColumnBinding::nav(name));
    }

    let sentinel_column = link
        .foreign_keys
        .first()
        .and_then(|k| target.column(k))
        .ok_or_else(|| {
            ctx.validation(format!(
                "navigation {}.{} declares no foreign key on {}",
                owner.type_name, link.member, target.type_name
            ))
        })?;
    let sentinel = out.columns.len();
    let sentinel_name = ctx.hidden_name('s');
    out.select.push(
        SelectExpr::new(column(&alias, &sentinel_column.name)).with_alias(&sentinel_name),
    );
    out.columns.push(ColumnBinding::hidden(sentinel_name));

    if link.is_collection {
        child_keys.extend(target.key_columns().map(|k| column(&alias, &k.name)));
    }

    let index = out.navigations.len();
    out.navigations.push(NavigationDescriptor {
        path: node.path.clone(),
        member: link.member.clone(),
        parent,
        start,
        field_count: target.columns.len(),
        sentinel,
        is_collection: link.is_collection,
        owner: Arc::clone(owner),
        target: Arc::clone(&target),
    });

    for child in &node.children {
        emit_include(ctx, level, child, &alias, &target, Some(index), out, child_keys)?;
    }
    Ok(())
}
