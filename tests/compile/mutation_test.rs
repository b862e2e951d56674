#[path = "../common/mod.rs"]
mod common;

use quarry::command::{RoundTrip, Shape};
use quarry::prelude::*;
use quarry::sql::test_utils::validate_sql;

use common::{registry, Customer, Line, Order};

const DIALECTS: [Dialect; 4] = [Dialect::TSql, Dialect::MySql, Dialect::Postgres, Dialect::Sqlite];

fn compile(mutation: &Mutation, dialect: Dialect) -> Command {
    let command = mutation.to_command(CompileOptions::new(dialect)).unwrap();
    validate_sql(command.sql(), dialect).unwrap();
    command
}

fn order() -> Order {
    Order {
        id: 12,
        customer_id: 7,
        date: common::at(2024, 5, 1),
        total: 80.0,
        notes: Some("gift".into()),
        ..Order::default()
    }
}

#[test]
fn test_insert_identity_per_dialect() {
    let registry = registry();
    let mutation = Mutation::insert_in(&registry, &Line::new(3, "washer", 4));
    for dialect in DIALECTS {
        let command = compile(&mutation, dialect);
        assert!(matches!(command.shape(), Shape::Insert { identity: true }));
        assert!(!command.sql().contains("\"Id\","), "{}", command.sql());
        assert_eq!(command.params().len(), 4);
        assert_eq!(command.result_set_count(), 1);
        match dialect {
            Dialect::Postgres => assert!(command.trailer_sql().is_none()),
            _ => assert!(command.trailer_sql().is_some(), "{dialect:?}"),
        }
    }
}

#[test]
fn test_insert_without_identity_sends_key() {
    let customer = Customer {
        id: 11,
        name: "Di".into(),
        ..Customer::default()
    };
    let command = compile(&Mutation::insert_in(&registry(), &customer), Dialect::Sqlite);
    assert!(matches!(command.shape(), Shape::Insert { identity: false }));
    assert!(command.trailer_sql().is_none());
    assert_eq!(command.params()[0].value, Value::Int(11));
    assert_eq!(command.result_set_count(), 0);
}

#[test]
fn test_update_and_delete_by_key() {
    let registry = registry();
    for dialect in DIALECTS {
        let update = compile(&Mutation::update_in(&registry, &order()), dialect);
        assert!(update.sql().starts_with("UPDATE"), "{}", update.sql());
        // the key, then five SET values
        assert_eq!(update.params().len(), 6);
        assert_eq!(update.params()[0].value, Value::Int(12));

        let delete = compile(&Mutation::delete_in(&registry, &order()), dialect);
        assert!(delete.sql().starts_with("DELETE"), "{}", delete.sql());
        assert_eq!(delete.params().len(), 1);
        assert!(matches!(delete.shape(), Shape::Mutation));
    }
}

#[test]
fn test_set_based_update_per_dialect() {
    let q = Query::<Order>::table_in(&registry())
        .filter(field("Shipped").not().and(field("Total").lt(10)))
        .update_set([("Notes", lit("small")), ("Total", field("Total").add(1))]);
    for dialect in DIALECTS {
        let command = compile(&q, dialect);
        assert_eq!(command.params().len(), 3, "{}", command.sql());
    }
}

#[test]
fn test_delete_through_navigation_every_dialect() {
    let q = Query::<Order>::table_in(&registry())
        .filter(field("Customer").field("Active").not())
        .delete();
    for dialect in DIALECTS {
        let command = q.to_command(CompileOptions::new(dialect)).unwrap();
        assert!(command.sql().starts_with("DELETE"), "{}", command.sql());
        assert!(command.sql().contains("Customers"), "{}", command.sql());
    }
}

#[test]
fn test_unknown_set_column_rejected() {
    let q = Query::<Order>::table_in(&registry()).update_set([("Colour", lit("red"))]);
    let err = q.to_command(CompileOptions::default()).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_round_trip_renumbers_parameters() {
    let registry = registry();
    let first = Mutation::insert_in(&registry, &Line::new(1, "a", 1))
        .to_command(CompileOptions::new(Dialect::Sqlite))
        .unwrap();
    let second = Mutation::insert_in(&registry, &Line::new(1, "b", 2))
        .to_command(CompileOptions::new(Dialect::Sqlite))
        .unwrap();

    let trip = RoundTrip::new(Dialect::Sqlite, [&first, &second]);
    assert_eq!(trip.statements.len(), 4);
    assert_eq!(trip.result_set_count(), 2);
    assert!(trip.statements[2].sql.contains(":p4"), "{}", trip.statements[2].sql);
    assert!(!trip.statements[2].sql.contains(":p0"));

    let names: Vec<_> = trip.params().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["p0", "p1", "p2", "p3", "p4", "p5", "p6", "p7"]);
    assert_eq!(trip.text().matches("last_insert_rowid").count(), 2);
}
