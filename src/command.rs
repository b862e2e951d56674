//! Compiled commands and the round trips that carry them.
//!
//! A [`Command`] is the immutable output of one compile: SQL tokens, bound
//! parameters, and the column map the materializer reads rows with. Commands
//! are `Send + Sync` and can be compiled once and executed many times.
//!
//! Several commands travel to the server together as a [`RoundTrip`]; their
//! parameters are renumbered so the markers of one command never collide
//! with another's.

use std::fmt;
use std::sync::Arc;

use crate::metadata::EntityMetadata;
use crate::sql::{Dialect, TokenStream};
use crate::value::{TypeHint, Value};

/// A bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Marker name without the dialect prefix (`p0`, `p1`, ..).
    pub name: String,
    pub value: Value,
    pub hint: TypeHint,
    pub size: Option<u32>,
    pub scale: Option<u8>,
}

/// One column of the result set, in select-list order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    /// Column name as it appears in the result set.
    pub name: String,
    /// Member the column fills on the root shape, if any.
    pub field: Option<String>,
    /// Ordering and sentinel columns never reach a typed shape.
    pub hidden: bool,
}

impl ColumnBinding {
    pub(crate) fn field(name: &str, field: &str) -> Self {
        Self {
            name: name.to_string(),
            field: Some(field.to_string()),
            hidden: false,
        }
    }

    pub(crate) fn nav(name: String) -> Self {
        Self {
            name,
            field: None,
            hidden: false,
        }
    }

    pub(crate) fn hidden(name: String) -> Self {
        Self {
            name,
            field: None,
            hidden: true,
        }
    }
}

/// Where an included navigation's columns sit in each row.
#[derive(Clone)]
pub struct NavigationDescriptor {
    /// Dotted path from the root, e.g. `Customer.Address`.
    pub path: String,
    pub member: String,
    /// Index of the owning navigation in the command's list; `None` for
    /// navigations of the root entity.
    pub parent: Option<usize>,
    /// Ordinal of the first column of the target entity.
    pub start: usize,
    /// One column per target column, in metadata order.
    pub field_count: usize,
    /// Ordinal of the split sentinel; NULL there means no related row.
    pub sentinel: usize,
    pub is_collection: bool,
    pub owner: Arc<EntityMetadata>,
    pub target: Arc<EntityMetadata>,
}

impl fmt::Debug for NavigationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationDescriptor")
            .field("path", &self.path)
            .field("parent", &self.parent)
            .field("start", &self.start)
            .field("field_count", &self.field_count)
            .field("sentinel", &self.sentinel)
            .field("is_collection", &self.is_collection)
            .finish()
    }
}

/// What the rows of a command materialize as.
#[derive(Debug, Clone)]
pub enum Shape {
    /// Rows of a mapped entity, fields bound by [`ColumnBinding::field`].
    Entity(Arc<EntityMetadata>),
    /// Projected records, one value per member.
    Members,
    /// A single value (aggregates).
    Scalar,
    /// A single 1/0 value.
    Exists,
    /// No rows; only an affected-row count.
    Mutation,
    /// An insert; with `identity` it also yields the generated key.
    Insert { identity: bool },
}

/// A compiled, ready-to-run statement.
#[derive(Debug, Clone)]
pub struct Command {
    pub(crate) dialect: Dialect,
    pub(crate) tokens: TokenStream,
    /// Statement run right after this one, e.g. reading back an identity.
    pub(crate) trailer: Option<TokenStream>,
    pub(crate) params: Vec<Parameter>,
    pub(crate) columns: Vec<ColumnBinding>,
    pub(crate) navigations: Vec<NavigationDescriptor>,
    pub(crate) shape: Shape,
    sql: String,
}

impl Command {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        dialect: Dialect,
        tokens: TokenStream,
        trailer: Option<TokenStream>,
        params: Vec<Parameter>,
        columns: Vec<ColumnBinding>,
        navigations: Vec<NavigationDescriptor>,
        shape: Shape,
    ) -> Self {
        let sql = tokens.serialize(dialect);
        Self {
            dialect,
            tokens,
            trailer,
            params,
            columns,
            navigations,
            shape,
            sql,
        }
    }

    /// SQL text of the main statement.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// SQL text of the trailing statement, if any.
    pub fn trailer_sql(&self) -> Option<String> {
        self.trailer.as_ref().map(|t| t.serialize(self.dialect))
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn columns(&self) -> &[ColumnBinding] {
        &self.columns
    }

    pub fn navigations(&self) -> &[NavigationDescriptor] {
        &self.navigations
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Whether the main statement returns rows.
    fn main_produces_rows(&self) -> bool {
        match self.shape {
            Shape::Mutation => false,
            Shape::Insert { identity } => identity && self.trailer.is_none(),
            _ => true,
        }
    }

    /// Result sets this command contributes to a cursor.
    pub fn result_set_count(&self) -> usize {
        usize::from(self.main_produces_rows()) + usize::from(self.trailer.is_some())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)?;
        if let Some(trailer) = self.trailer_sql() {
            write!(f, ";\n{trailer}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Round trips
// =============================================================================

/// One statement of a round trip, with its parameters already renumbered.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Parameter>,
    pub produces_rows: bool,
}

/// Commands sent to the server in one physical exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundTrip {
    pub dialect: Dialect,
    pub statements: Vec<Statement>,
}

impl RoundTrip {
    /// Pack commands in order, offsetting each command's parameter ordinals
    /// by the number of parameters before it.
    pub fn new<'a>(dialect: Dialect, commands: impl IntoIterator<Item = &'a Command>) -> Self {
        let mut statements = Vec::new();
        let mut offset = 0;
        for command in commands {
            let params = command
                .params
                .iter()
                .enumerate()
                .map(|(i, p)| Parameter {
                    name: format!("p{}", offset + i),
                    ..p.clone()
                })
                .collect();
            statements.push(Statement {
                sql: command.tokens.serialize_with(dialect, offset),
                params,
                produces_rows: command.main_produces_rows(),
            });
            if let Some(trailer) = &command.trailer {
                statements.push(Statement {
                    sql: trailer.serialize(dialect),
                    params: Vec::new(),
                    produces_rows: true,
                });
            }
            offset += command.params.len();
        }
        Self {
            dialect,
            statements,
        }
    }

    /// The whole exchange as one script.
    pub fn text(&self) -> String {
        self.statements
            .iter()
            .map(|s| s.sql.as_str())
            .collect::<Vec<_>>()
            .join(";\n")
    }

    pub fn params(&self) -> impl Iterator<Item = &Parameter> {
        self.statements.iter().flat_map(|s| s.params.iter())
    }

    /// Result sets a cursor over this round trip holds.
    pub fn result_set_count(&self) -> usize {
        self.statements.iter().filter(|s| s.produces_rows).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::Token;

    fn command(param_values: &[i64], shape: Shape, trailer: bool) -> Command {
        let mut tokens = TokenStream::new();
        tokens.push(Token::Select).space();
        let mut params = Vec::new();
        for (i, v) in param_values.iter().enumerate() {
            if i > 0 {
                tokens.comma().space();
            }
            tokens.push(Token::Param(i));
            params.push(Parameter {
                name: format!("p{i}"),
                value: Value::Int(*v),
                hint: TypeHint::Int,
                size: None,
                scale: None,
            });
        }
        let trailer = trailer.then(|| {
            let mut ts = TokenStream::new();
            ts.push(Token::Select)
                .space()
                .push(Token::Raw("last_insert_rowid()".into()));
            ts
        });
        Command::new(Dialect::Sqlite, tokens, trailer, params, Vec::new(), Vec::new(), shape)
    }

    #[test]
    fn test_round_trip_renumbers_parameters() {
        let a = command(&[1, 2], Shape::Scalar, false);
        let b = command(&[3], Shape::Scalar, false);
        let trip = RoundTrip::new(Dialect::Sqlite, [&a, &b]);
        assert_eq!(trip.statements[0].sql, "SELECT :p0, :p1");
        assert_eq!(trip.statements[1].sql, "SELECT :p2");
        let names: Vec<_> = trip.params().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["p0", "p1", "p2"]);
        assert_eq!(trip.params().nth(2).unwrap().value, Value::Int(3));
    }

    #[test]
    fn test_result_sets_count_identity_trailers() {
        let insert = command(&[1], Shape::Insert { identity: true }, true);
        let update = command(&[1], Shape::Mutation, false);
        assert_eq!(insert.result_set_count(), 1);
        assert_eq!(update.result_set_count(), 0);

        let trip = RoundTrip::new(Dialect::Sqlite, [&insert, &update, &insert]);
        assert_eq!(trip.statements.len(), 5);
        assert_eq!(trip.result_set_count(), 2);
        assert!(trip.text().contains("last_insert_rowid()"));
    }
}
