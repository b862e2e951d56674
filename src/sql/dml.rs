//! DML (Data Manipulation Language) support.
//!
//! This module provides types and builders for generating DML statements
//! (INSERT, UPDATE, DELETE) across different SQL dialects.
//!
//! Statements with more than one source take the dialect's joined form,
//! picked through [`MutationStyle`]:
//!
//! ```text
//!   JoinedTarget   UPDATE T AS t0 JOIN .. SET t0.c = ..        (MySQL)
//!   JoinedFrom     UPDATE t0 SET c = .. FROM T AS t0 JOIN ..   (T-SQL)
//! ```

use super::dialect::{Dialect, MutationStyle, SqlDialect};
use super::expr::{BinaryOperator, Expr};
use super::query::{value_tokens, Join, Query, TableRef};
use super::token::{Token, TokenStream};

// ============================================================================
// INSERT
// ============================================================================

/// INSERT statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Insert {
    pub target: TableRef,
    pub columns: Vec<String>,
    pub values: Vec<Expr>,
    pub from_query: Option<Box<Query>>,
    pub returning: Vec<String>,
}

impl Insert {
    /// Create a new INSERT statement.
    pub fn into(target: TableRef) -> Self {
        Self {
            target,
            columns: Vec::new(),
            values: Vec::new(),
            from_query: None,
            returning: Vec::new(),
        }
    }

    /// Set columns to insert.
    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = cols.into_iter().map(|c| c.into()).collect();
        self
    }

    /// Set the single row of values.
    pub fn values(mut self, vals: impl IntoIterator<Item = impl Into<Expr>>) -> Self {
        self.values = vals.into_iter().map(|v| v.into()).collect();
        self
    }

    /// Insert from a SELECT query.
    pub fn from_select(mut self, query: Query) -> Self {
        self.from_query = Some(Box::new(query));
        self
    }

    /// Add RETURNING clause (only emitted where supported).
    pub fn returning(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.returning = cols.into_iter().map(|c| c.into()).collect();
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        // INSERT INTO
        ts.push(Token::Insert).space().push(Token::Into).space();
        ts.append(&self.target.name_tokens());

        if self.columns.is_empty() && self.from_query.is_none() {
            ts.space().append(&dialect.emit_default_values());
        } else {
            if !self.columns.is_empty() {
                ts.space().lparen();
                for (i, col) in self.columns.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    ts.push(Token::Ident(col.clone()));
                }
                ts.rparen();
            }

            // VALUES or SELECT
            if let Some(ref query) = self.from_query {
                ts.newline().append(&query.to_tokens_for_dialect(dialect));
            } else {
                ts.newline().push(Token::Values).space().lparen();
                for (i, val) in self.values.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    ts.append(&value_tokens(val, dialect));
                }
                ts.rparen();
            }
        }

        // RETURNING (PostgreSQL)
        if !self.returning.is_empty() && dialect.supports_returning() {
            ts.newline().push(Token::Returning).space();
            for (i, col) in self.returning.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.push(Token::Ident(col.clone()));
            }
        }

        ts
    }
}

// ============================================================================
// UPDATE
// ============================================================================

/// The target of an UPDATE or DELETE joined with further sources.
#[derive(Debug, Clone)]
pub struct JoinedTarget {
    /// Alias the target table carries inside the statement.
    pub alias: String,
    pub joins: Vec<Join>,
}

/// UPDATE statement.
///
/// Without a joined target this is `UPDATE T SET .. WHERE ..`. With one it
/// takes the dialect's joined form; the caller picks the correlated form
/// itself for dialects whose [`MutationStyle`] is `Correlated`.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Update {
    pub target: TableRef,
    pub set: Vec<(String, Expr)>,
    pub joined: Option<JoinedTarget>,
    pub filter: Option<Expr>,
}

impl Update {
    /// Create a new UPDATE statement.
    pub fn table(target: TableRef) -> Self {
        Self {
            target,
            set: Vec::new(),
            joined: None,
            filter: None,
        }
    }

    /// Add a SET clause.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.set.push((column.into(), value.into()));
        self
    }

    /// Alias the target and join it with other sources.
    pub fn joined(mut self, alias: &str, joins: Vec<Join>) -> Self {
        self.joined = Some(JoinedTarget {
            alias: alias.into(),
            joins,
        });
        self
    }

    /// Add WHERE clause (ANDed with existing conditions).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => and(existing, expr),
            None => expr,
        });
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Update).space();

        match (&self.joined, dialect.mutation_style()) {
            (None, _) => {
                ts.append(&self.target.name_tokens());
                self.emit_set(&mut ts, dialect, None);
            }
            (Some(joined), MutationStyle::JoinedTarget) => {
                // UPDATE T AS t0 JOIN .. SET t0.c = ..
                ts.append(&aliased(&self.target, &joined.alias).to_tokens());
                emit_joins(&mut ts, &joined.joins, dialect);
                self.emit_set(&mut ts, dialect, Some(&joined.alias));
            }
            (Some(joined), _) => {
                // UPDATE t0 SET c = .. FROM T AS t0 JOIN ..
                ts.push(Token::Ident(joined.alias.clone()));
                self.emit_set(&mut ts, dialect, None);
                ts.newline().push(Token::From).space();
                ts.append(&aliased(&self.target, &joined.alias).to_tokens());
                emit_joins(&mut ts, &joined.joins, dialect);
            }
        }

        if let Some(ref filter) = self.filter {
            ts.newline()
                .push(Token::Where)
                .space()
                .append(&filter.to_tokens_for_dialect(dialect));
        }

        ts
    }

    fn emit_set(&self, ts: &mut TokenStream, dialect: Dialect, qualifier: Option<&str>) {
        ts.newline().push(Token::Set);
        for (i, (col, expr)) in self.set.iter().enumerate() {
            if i > 0 {
                ts.comma();
            }
            ts.newline().indent(1);
            if let Some(q) = qualifier {
                ts.push(Token::Ident(q.into())).push(Token::Dot);
            }
            ts.push(Token::Ident(col.clone()))
                .space()
                .push(Token::Eq)
                .space()
                .append(&value_tokens(expr, dialect));
        }
    }
}

// ============================================================================
// DELETE
// ============================================================================

/// DELETE statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Delete {
    pub target: TableRef,
    pub joined: Option<JoinedTarget>,
    pub filter: Option<Expr>,
}

impl Delete {
    /// Create a new DELETE statement.
    pub fn from(target: TableRef) -> Self {
        Self {
            target,
            joined: None,
            filter: None,
        }
    }

    /// Alias the target and join it with other sources.
    pub fn joined(mut self, alias: &str, joins: Vec<Join>) -> Self {
        self.joined = Some(JoinedTarget {
            alias: alias.into(),
            joins,
        });
        self
    }

    /// Add WHERE clause (ANDed with existing conditions).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => and(existing, expr),
            None => expr,
        });
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Delete).space();

        match &self.joined {
            None => {
                ts.push(Token::From).space();
                ts.append(&self.target.name_tokens());
            }
            Some(joined) => {
                // DELETE t0 FROM T AS t0 JOIN .. (T-SQL and MySQL alike)
                ts.push(Token::Ident(joined.alias.clone()))
                    .newline()
                    .push(Token::From)
                    .space();
                ts.append(&aliased(&self.target, &joined.alias).to_tokens());
                emit_joins(&mut ts, &joined.joins, dialect);
            }
        }

        if let Some(ref filter) = self.filter {
            ts.newline()
                .push(Token::Where)
                .space()
                .append(&filter.to_tokens_for_dialect(dialect));
        }

        ts
    }
}

fn aliased(target: &TableRef, alias: &str) -> TableRef {
    target.clone().with_alias(alias)
}

fn emit_joins(ts: &mut TokenStream, joins: &[Join], dialect: Dialect) {
    for join in joins {
        ts.newline().append(&join.to_tokens_for_dialect(dialect));
    }
}

fn and(left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op: BinaryOperator::And,
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::expr::Literal;
    use crate::sql::query::{JoinType, SelectExpr};
    use crate::sql::test_utils::exprs::{col, eq, lit_int, lit_str, param, table_col};
    use crate::sql::test_utils::validate_sql;

    #[test]
    fn test_insert_values() {
        let insert = Insert::into(TableRef::new("users"))
            .columns(["name", "age"])
            .values([param(0), param(1)]);

        assert_eq!(
            insert.to_sql(Dialect::Sqlite),
            "INSERT INTO \"users\" (\"name\", \"age\")\nVALUES (:p0, :p1)"
        );
        validate_sql(&insert.to_sql(Dialect::TSql), Dialect::TSql).unwrap();
    }

    #[test]
    fn test_insert_default_values() {
        let insert = Insert::into(TableRef::new("events"));
        assert_eq!(
            insert.to_sql(Dialect::Postgres),
            "INSERT INTO \"events\" DEFAULT VALUES"
        );
        assert_eq!(
            insert.to_sql(Dialect::MySql),
            "INSERT INTO `events` () VALUES ()"
        );
    }

    #[test]
    fn test_insert_returning_only_on_postgres() {
        let insert = Insert::into(TableRef::new("users"))
            .columns(["name"])
            .values([lit_str("a")])
            .returning(["id"]);

        assert!(insert.to_sql(Dialect::Postgres).ends_with("RETURNING \"id\""));
        assert!(!insert.to_sql(Dialect::TSql).contains("RETURNING"));
    }

    #[test]
    fn test_insert_from_select() {
        let select = Query {
            select: vec![SelectExpr::new(col("name"))],
            from: Some(TableRef::new("staging").into()),
            ..Query::default()
        };
        let insert = Insert::into(TableRef::new("users"))
            .columns(["name"])
            .from_select(select);

        let sql = insert.to_sql(Dialect::Postgres);
        assert_eq!(
            sql,
            "INSERT INTO \"users\" (\"name\")\nSELECT\n  \"name\"\nFROM \"staging\""
        );
        validate_sql(&sql, Dialect::Postgres).unwrap();
    }

    #[test]
    fn test_update_direct() {
        let update = Update::table(TableRef::new("users"))
            .set("name", param(0))
            .filter(eq(col("id"), param(1)));

        let sql = update.to_sql(Dialect::TSql);
        assert_eq!(sql, "UPDATE [users]\nSET\n  [name] = @p0\nWHERE [id] = @p1");
        validate_sql(&sql, Dialect::TSql).unwrap();
    }

    fn orders_join() -> Vec<Join> {
        vec![Join {
            join_type: JoinType::Inner,
            source: TableRef::new("customers").with_alias("t1").into(),
            on: Some(eq(table_col("t0", "customer_id"), table_col("t1", "id"))),
        }]
    }

    #[test]
    fn test_update_joined_tsql() {
        let update = Update::table(TableRef::new("orders"))
            .set("status", lit_int(2))
            .joined("t0", orders_join())
            .filter(eq(table_col("t1", "vip"), lit_int(1)));

        let sql = update.to_sql(Dialect::TSql);
        insta::assert_snapshot!(sql, @r###"
        UPDATE [t0]
        SET
          [status] = 2
        FROM [orders] AS [t0]
        INNER JOIN [customers] AS [t1] ON [t0].[customer_id] = [t1].[id]
        WHERE [t1].[vip] = 1
        "###);
        validate_sql(&sql, Dialect::TSql).unwrap();
    }

    #[test]
    fn test_update_joined_mysql() {
        let update = Update::table(TableRef::new("orders"))
            .set("status", lit_int(2))
            .joined("t0", orders_join());

        let sql = update.to_sql(Dialect::MySql);
        insta::assert_snapshot!(sql, @r###"
        UPDATE `orders` AS `t0`
        INNER JOIN `customers` AS `t1` ON `t0`.`customer_id` = `t1`.`id`
        SET
          `t0`.`status` = 2
        "###);
        validate_sql(&sql, Dialect::MySql).unwrap();
    }

    #[test]
    fn test_delete_joined() {
        let delete = Delete::from(TableRef::new("orders"))
            .joined("t0", orders_join())
            .filter(eq(table_col("t1", "vip"), lit_int(0)));

        let sql = delete.to_sql(Dialect::TSql);
        assert!(sql.starts_with("DELETE [t0]\nFROM [orders] AS [t0]\nINNER JOIN"));
    }

    #[test]
    fn test_filters_combine_with_and() {
        let delete = Delete::from(TableRef::new("orders"))
            .filter(eq(col("a"), lit_int(1)))
            .filter(Expr::IsNull {
                expr: Box::new(col("b")),
                negated: false,
            });
        assert_eq!(
            delete.to_sql(Dialect::Sqlite),
            "DELETE FROM \"orders\"\nWHERE \"a\" = 1 AND \"b\" IS NULL"
        );
    }

    #[test]
    fn test_delete_correlated() {
        let matching = Query {
            select: vec![SelectExpr::new(Expr::Literal(Literal::Int(1)))],
            from: Some(TableRef::new("orders").with_alias("t0").into()),
            where_clause: Some(eq(table_col("t0", "id"), table_col("orders", "id"))),
            ..Query::default()
        };
        let delete = Delete::from(TableRef::new("orders")).filter(Expr::Exists(Box::new(matching)));

        let sql = delete.to_sql(Dialect::Sqlite);
        assert_eq!(
            sql,
            "DELETE FROM \"orders\"\nWHERE EXISTS (SELECT\n  1\nFROM \"orders\" AS \"t0\"\nWHERE \"t0\".\"id\" = \"orders\".\"id\")"
        );
        validate_sql(&sql, Dialect::Sqlite).unwrap();
    }
}
