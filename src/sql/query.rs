//! Query builder - construct SQL queries with a fluent API.

use super::dialect::{Dialect, SqlDialect};
use super::expr::Expr;
use super::token::{Token, TokenStream};

// =============================================================================
// Select Expression (column with optional alias)
// =============================================================================

/// A SELECT list item: expression with optional alias.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct SelectExpr {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectExpr {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = value_tokens(&self.expr, dialect);
        if let Some(alias) = &self.alias {
            ts.space()
                .push(Token::As)
                .space()
                .push(Token::Ident(alias.clone()));
        }
        ts
    }
}

impl From<Expr> for SelectExpr {
    fn from(expr: Expr) -> Self {
        SelectExpr::new(expr)
    }
}

/// Render an expression in a value position.
///
/// Predicates become `CASE WHEN .. THEN 1 ELSE 0 END` on dialects without a
/// boolean expression type.
pub fn value_tokens(expr: &Expr, dialect: Dialect) -> TokenStream {
    if !dialect.supports_boolean_expressions() && expr.is_predicate() {
        let mut ts = TokenStream::new();
        ts.push(Token::Case)
            .space()
            .push(Token::When)
            .space()
            .append(&expr.to_tokens_for_dialect(dialect))
            .space()
            .push(Token::Then)
            .space()
            .push(Token::LitInt(1))
            .space()
            .push(Token::Else)
            .space()
            .push(Token::LitInt(0))
            .space()
            .push(Token::End);
        return ts;
    }
    expr.to_tokens_for_dialect(dialect)
}

// =============================================================================
// Table Reference
// =============================================================================

/// A table reference with optional schema and alias.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct TableRef {
    pub schema: Option<String>,
    pub table: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(table: &str) -> Self {
        Self {
            schema: None,
            table: table.into(),
            alias: None,
        }
    }

    pub fn with_schema(mut self, schema: Option<&str>) -> Self {
        self.schema = schema.map(String::from);
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The qualified name without alias.
    pub fn name_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::QualifiedIdent {
            schema: self.schema.clone(),
            name: self.table.clone(),
        });
        ts
    }

    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = self.name_tokens();
        if let Some(alias) = &self.alias {
            ts.space()
                .push(Token::As)
                .space()
                .push(Token::Ident(alias.clone()));
        }
        ts
    }
}

/// Anything that can appear after FROM or JOIN.
#[derive(Debug, Clone, PartialEq)]
pub enum FromSource {
    Table(TableRef),
    /// A nested select wrapped in parentheses with its own alias.
    Derived { query: Box<Query>, alias: String },
}

impl FromSource {
    pub fn derived(query: Query, alias: &str) -> Self {
        FromSource::Derived {
            query: Box::new(query),
            alias: alias.into(),
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            FromSource::Table(t) => t.alias.as_deref(),
            FromSource::Derived { alias, .. } => Some(alias),
        }
    }

    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        match self {
            FromSource::Table(t) => t.to_tokens(),
            FromSource::Derived { query, alias } => {
                let mut ts = TokenStream::new();
                ts.lparen()
                    .newline()
                    .append(&query.to_tokens_for_dialect(dialect))
                    .newline()
                    .rparen()
                    .space()
                    .push(Token::As)
                    .space()
                    .push(Token::Ident(alias.clone()));
                ts
            }
        }
    }
}

impl From<TableRef> for FromSource {
    fn from(t: TableRef) -> Self {
        FromSource::Table(t)
    }
}

// =============================================================================
// Joins
// =============================================================================

/// Type of join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Cross,
}

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub source: FromSource,
    pub on: Option<Expr>,
}

impl Join {
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        match self.join_type {
            JoinType::Inner => ts.push(Token::Inner),
            JoinType::Left => ts.push(Token::Left),
            JoinType::Right => ts.push(Token::Right),
            JoinType::Cross => ts.push(Token::Cross),
        };

        ts.space().push(Token::Join).space();
        ts.append(&self.source.to_tokens_for_dialect(dialect));

        if let Some(on) = &self.on {
            ts.space().push(Token::On).space();
            ts.append(&on.to_tokens_for_dialect(dialect));
        }

        ts
    }
}

// =============================================================================
// ORDER BY
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// An ORDER BY expression.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct OrderByExpr {
    pub expr: Expr,
    pub dir: Option<SortDir>,
}

impl OrderByExpr {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            dir: Some(SortDir::Asc),
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            dir: Some(SortDir::Desc),
        }
    }

    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = value_tokens(&self.expr, dialect);

        if let Some(dir) = &self.dir {
            ts.space().push(match dir {
                SortDir::Asc => Token::Asc,
                SortDir::Desc => Token::Desc,
            });
        }

        ts
    }
}

// =============================================================================
// LIMIT / OFFSET
// =============================================================================

/// LIMIT and OFFSET clause.
///
/// The counts are expressions so they can be bound parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimitOffset {
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
}

impl LimitOffset {
    /// Convert to token stream using dialect-specific pagination.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let limit = self.limit.as_ref().map(|e| e.to_tokens_for_dialect(dialect));
        let offset = self
            .offset
            .as_ref()
            .map(|e| e.to_tokens_for_dialect(dialect));
        dialect.emit_limit_offset(limit.as_ref(), offset.as_ref())
    }

    /// Whether this is a take-only clause, expressible as TOP.
    fn is_take_only(&self) -> bool {
        self.limit.is_some() && self.offset.is_none()
    }
}

// =============================================================================
// SELECT
// =============================================================================

/// A SELECT statement, assembled field by field by the compiler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub select: Vec<SelectExpr>,
    pub distinct: bool,
    pub from: Option<FromSource>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit_offset: Option<LimitOffset>,
    /// Branches appended with UNION ALL, in order.
    pub union_all: Vec<Query>,
}

impl Query {
    /// Create a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert to token stream for a specific dialect.
    pub fn to_tokens_for_dialect(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        let use_top = dialect.supports_top()
            && self.limit_offset.as_ref().is_some_and(LimitOffset::is_take_only);

        // SELECT
        ts.push(Token::Select);
        if self.distinct {
            ts.space().push(Token::Distinct);
        }
        if use_top {
            if let Some(limit) = self.limit_offset.as_ref().and_then(|lo| lo.limit.as_ref()) {
                ts.space()
                    .push(Token::Top)
                    .space()
                    .lparen()
                    .append(&limit.to_tokens_for_dialect(dialect))
                    .rparen();
            }
        }

        // Columns
        if self.select.is_empty() {
            ts.space().push(Token::Star);
        }
        for (i, select_expr) in self.select.iter().enumerate() {
            if i == 0 {
                ts.newline().indent(1);
            } else {
                ts.comma().newline().indent(1);
            }
            ts.append(&select_expr.to_tokens_for_dialect(dialect));
        }

        // FROM
        if let Some(from) = &self.from {
            ts.newline().push(Token::From).space();
            ts.append(&from.to_tokens_for_dialect(dialect));
        }

        // JOINs
        for join in &self.joins {
            ts.newline();
            ts.append(&join.to_tokens_for_dialect(dialect));
        }

        // WHERE
        if let Some(where_clause) = &self.where_clause {
            ts.newline().push(Token::Where).space();
            ts.append(&where_clause.to_tokens_for_dialect(dialect));
        }

        // GROUP BY
        if !self.group_by.is_empty() {
            ts.newline().push(Token::GroupBy).space();
            for (i, expr) in self.group_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&expr.to_tokens_for_dialect(dialect));
            }
        }

        // HAVING
        if let Some(having) = &self.having {
            ts.newline().push(Token::Having).space();
            ts.append(&having.to_tokens_for_dialect(dialect));
        }

        // ORDER BY
        // T-SQL requires ORDER BY for OFFSET FETCH syntax.
        let needs_order_by_placeholder = dialect.requires_order_by_for_offset()
            && self.order_by.is_empty()
            && self.limit_offset.is_some()
            && !use_top;

        if !self.order_by.is_empty() {
            ts.newline().push(Token::OrderBy).space();
            for (i, order_expr) in self.order_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&order_expr.to_tokens_for_dialect(dialect));
            }
        } else if needs_order_by_placeholder {
            // Row order is unspecified here; the compiler only reaches this
            // for take-with-offset shapes it has already validated.
            ts.newline()
                .push(Token::OrderBy)
                .space()
                .lparen()
                .push(Token::Select)
                .space()
                .push(Token::Null)
                .rparen();
        }

        // LIMIT / OFFSET
        if let Some(lo) = &self.limit_offset {
            if !use_top {
                ts.newline();
                ts.append(&lo.to_tokens(dialect));
            }
        }

        // UNION ALL branches
        for branch in &self.union_all {
            ts.newline()
                .push(Token::Union)
                .space()
                .push(Token::All)
                .newline()
                .append(&branch.to_tokens_for_dialect(dialect));
        }

        ts
    }

    /// Generate SQL string for a specific dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens_for_dialect(dialect).serialize(dialect)
    }
}

// =============================================================================
// Tests
// =============================================================================
