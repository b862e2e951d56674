#[path = "../common/mod.rs"]
mod common;

use insta::assert_snapshot;
use quarry::command::Shape;
use quarry::prelude::*;
use quarry::sql::test_utils::validate_sql;

use common::{registry, Customer, Order};

const DIALECTS: [Dialect; 4] = [Dialect::TSql, Dialect::MySql, Dialect::Postgres, Dialect::Sqlite];

fn orders() -> Query<Order> {
    Query::<Order>::table_in(&registry())
}

fn compile<T: 'static>(query: &Query<T>, dialect: Dialect) -> Command {
    let command = query.to_command(CompileOptions::new(dialect)).unwrap();
    validate_sql(command.sql(), dialect).unwrap();
    command
}

fn inline<T: 'static>(query: &Query<T>, dialect: Dialect) -> String {
    let command = query.to_command(CompileOptions::new(dialect).inline()).unwrap();
    assert!(command.params().is_empty());
    validate_sql(command.sql(), dialect).unwrap();
    command.sql().to_string()
}

fn values(command: &Command) -> Vec<Value> {
    command.params().iter().map(|p| p.value.clone()).collect()
}

fn recent_page() -> Query<Order> {
    orders()
        .filter(field("CustomerId").eq(7))
        .order_by_descending(field("Date"))
        .skip(10)
        .take(5)
}

#[test]
fn test_paged_orders_sqlite() {
    let command = compile(&recent_page(), Dialect::Sqlite);
    assert_snapshot!(command.sql(), @r#"
    SELECT
      "t0"."Id",
      "t0"."CustomerId",
      "t0"."Date",
      "t0"."Total",
      "t0"."Notes",
      "t0"."Shipped"
    FROM "Orders" AS "t0"
    WHERE "t0"."CustomerId" = :p0
    ORDER BY "t0"."Date" DESC
    LIMIT :p2 OFFSET :p1
    "#);
    assert_eq!(values(&command), [Value::Int(7), Value::Int(10), Value::Int(5)]);
}

#[test]
fn test_paged_orders_every_dialect() {
    for dialect in DIALECTS {
        let command = compile(&recent_page(), dialect);
        assert_eq!(command.sql().matches("SELECT").count(), 1, "{dialect:?}");
        assert_eq!(values(&command), [Value::Int(7), Value::Int(10), Value::Int(5)]);
        assert!(matches!(command.shape(), Shape::Entity(_)));
        assert_eq!(command.columns().len(), 6);
    }
}

#[test]
fn test_paged_orders_inline() {
    let sql = inline(&recent_page(), Dialect::Sqlite);
    assert!(sql.contains("WHERE \"t0\".\"CustomerId\" = 7"), "{sql}");
    assert!(sql.contains("ORDER BY \"t0\".\"Date\" DESC"), "{sql}");
    assert!(sql.contains("LIMIT 5 OFFSET 10"), "{sql}");
}

#[test]
fn test_consecutive_filters_are_one_conjunction() {
    let chained = orders()
        .filter(field("Total").gt(10))
        .filter(field("Shipped").not());
    let combined = orders().filter(field("Total").gt(10).and(field("Shipped").not()));
    for dialect in DIALECTS {
        assert_eq!(inline(&chained, dialect), inline(&combined, dialect));
    }
}

#[test]
fn test_alias_names_do_not_leak_between_compiles() {
    let customers = Query::<Customer>::table_in(&registry());
    let q = orders()
        .join(&customers, "c", field("CustomerId"), field("Id"))
        .filter(source("c").field("City").eq("Oslo"));
    let first = inline(&q, Dialect::Postgres);
    let second = inline(&q, Dialect::Postgres);
    assert_eq!(first, second);
    assert!(first.contains("\"t1\".\"City\" = 'Oslo'"), "{first}");
}

#[test]
fn test_skip_requires_order() {
    let err = orders().skip(3).to_command(CompileOptions::default()).unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("order_by"));

    // take alone is fine
    for dialect in DIALECTS {
        compile(&orders().take(3), dialect);
    }
}

#[test]
fn test_count_over_take_nests_exactly_once() {
    for dialect in DIALECTS {
        let counted = inline(&orders().take(5).count(), dialect);
        assert_eq!(counted.matches("SELECT").count(), 2, "{counted}");
        let taken = inline(&orders().take(5), dialect);
        assert_eq!(taken.matches("SELECT").count(), 1, "{taken}");
    }
}

#[test]
fn test_operator_after_paging_nests() {
    let q = orders()
        .order_by(field("Total"))
        .take(2)
        .filter(field("Shipped"));
    for dialect in DIALECTS {
        let sql = inline(&q, dialect);
        assert_eq!(sql.matches("SELECT").count(), 2, "{sql}");
    }
}

#[test]
fn test_projection_shape_and_members() {
    let q = orders().project(new_object([("Id", field("Id")), ("Spend", field("Total").mul(2))]));
    let command = compile(&q, Dialect::Sqlite);
    assert!(matches!(command.shape(), Shape::Members));
    let names: Vec<_> = command.columns().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Id", "Spend"]);
}

#[test]
fn test_include_tree_layout() {
    let q = orders().include("Customer.Address").unwrap().include("Lines").unwrap();
    for dialect in DIALECTS {
        let command = compile(&q, dialect);
        let mut paths: Vec<_> = command.navigations().iter().map(|n| n.path.as_str()).collect();
        paths.sort_unstable();
        assert_eq!(paths, ["Customer", "Customer.Address", "Lines"], "{dialect:?}");
        for nav in command.navigations() {
            assert!(command.columns()[nav.sentinel].hidden);
        }
    }
}

#[test]
fn test_unknown_include_rejected() {
    let err = orders().include("Warehouse").unwrap_err();
    assert!(err.to_string().contains("Warehouse"));
}

#[test]
fn test_aggregates_every_dialect() {
    let queries: Vec<(Query<Value>, &str)> = vec![
        (orders().sum(field("Total")), "SUM("),
        (orders().avg(field("Total")), "AVG("),
        (orders().min(field("Date")), "MIN("),
        (orders().max(field("Date")), "MAX("),
    ];
    for (query, function) in &queries {
        for dialect in DIALECTS {
            let command = compile(query, dialect);
            assert!(command.sql().contains(function), "{}", command.sql());
            assert!(matches!(command.shape(), Shape::Scalar));
        }
    }
}

#[test]
fn test_string_functions_every_dialect() {
    let q = orders()
        .filter(field("Notes").to_upper().contains("RUSH"))
        .filter(field("Notes").trim().length().gt(2))
        .order_by(field("Id"));
    for dialect in DIALECTS {
        compile(&q, dialect);
    }
}

#[test]
fn test_exists_and_count_shapes() {
    let any = compile(&orders().any_where(field("Total").gt(5)), Dialect::Sqlite);
    assert!(matches!(any.shape(), Shape::Exists));
    let count = compile(&orders().count_where(field("Shipped")), Dialect::Sqlite);
    assert!(matches!(count.shape(), Shape::Scalar));
    assert!(count.sql().contains("COUNT(*)"));
}
