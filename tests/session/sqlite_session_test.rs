#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use quarry::prelude::*;

use common::{registry, seeded, Customer, Line, Order};

struct Db {
    registry: Arc<MetadataRegistry>,
    session: Session<SqliteConnection>,
}

impl Db {
    fn new() -> Self {
        Self::with_options(SessionOptions::for_dialect(Dialect::Sqlite))
    }

    fn with_options(options: SessionOptions) -> Self {
        let registry = registry();
        let session = Session::new(seeded(), options).with_registry(Arc::clone(&registry));
        Self { registry, session }
    }

    fn orders(&self) -> Query<Order> {
        Query::<Order>::table_in(&self.registry)
    }

    fn customers(&self) -> Query<Customer> {
        Query::<Customer>::table_in(&self.registry)
    }

    fn lines(&self) -> Query<Line> {
        Query::<Line>::table_in(&self.registry)
    }

    fn line_count(&mut self) -> i64 {
        let count = self.lines().count();
        self.session.scalar(&count).unwrap()
    }
}

fn ids(orders: &[Order]) -> Vec<i64> {
    orders.iter().map(|o| o.id).collect()
}

#[test]
fn test_filter_and_order() {
    let mut db = Db::new();
    let q = db
        .orders()
        .filter(field("CustomerId").eq(7))
        .order_by_descending(field("Date"));
    let orders = db.session.list(&q).unwrap();
    assert_eq!(ids(&orders), [2, 1]);
    assert_eq!(orders[0].notes.as_deref(), Some("rush"));
    assert!(orders[1].shipped);
    assert_eq!(orders[1].date, common::at(2024, 1, 1));
}

#[test]
fn test_paging() {
    let mut db = Db::new();
    let q = db.orders().order_by(field("Id")).skip(1).take(2);
    assert_eq!(ids(&db.session.list(&q).unwrap()), [2, 3]);

    let tail = db.orders().order_by(field("Id")).skip(3);
    assert_eq!(ids(&db.session.list(&tail).unwrap()), [4]);
}

#[test]
fn test_date_parameter_compares_with_stored_text() {
    let mut db = Db::new();
    let q = db
        .orders()
        .filter(field("Date").gte(common::at(2024, 2, 1)))
        .order_by(field("Id"));
    assert_eq!(ids(&db.session.list(&q).unwrap()), [2, 3, 4]);
}

#[test]
fn test_include_references_are_null_safe() {
    let mut db = Db::new();
    let q = db
        .orders()
        .order_by(field("Id"))
        .include("Customer.Address")
        .unwrap();
    let orders = db.session.list(&q).unwrap();
    assert_eq!(ids(&orders), [1, 2, 3, 4]);

    let ann = orders[0].customer.as_ref().unwrap();
    assert_eq!(ann.name, "Ann");
    assert_eq!(ann.address.as_ref().map(|a| a.city.as_str()), Some("Oslo"));

    let bo = orders[2].customer.as_ref().unwrap();
    assert_eq!(bo.name, "Bo");
    assert_eq!(bo.city, None);
    assert_eq!(bo.address, None);

    // Customer 9 does not exist
    assert_eq!(orders[3].customer, None);
}

#[test]
fn test_include_collection() {
    let mut db = Db::new();
    let q = db.orders().order_by(field("Id")).include("Lines").unwrap();
    let orders = db.session.list(&q).unwrap();
    assert_eq!(ids(&orders), [1, 2, 3, 4]);

    let mut products: Vec<_> = orders[0].lines.iter().map(|l| l.product.as_str()).collect();
    products.sort_unstable();
    assert_eq!(products, ["bolt", "nut"]);
    assert_eq!(orders[1].lines.len(), 1);
    assert!(orders[2].lines.is_empty());
}

#[test]
fn test_include_collection_with_paged_parent() {
    let mut db = Db::new();
    let q = db
        .orders()
        .order_by(field("Id"))
        .take(1)
        .include("Lines")
        .unwrap();
    let orders = db.session.list(&q).unwrap();
    assert_eq!(ids(&orders), [1]);
    assert_eq!(orders[0].lines.len(), 2);
}

#[test]
fn test_scalars() {
    let mut db = Db::new();
    let count = db.orders().count();
    assert_eq!(db.session.scalar::<i64>(&count).unwrap(), 4);

    let shipped = db.orders().count_where(field("Shipped"));
    assert_eq!(db.session.scalar::<i64>(&shipped).unwrap(), 1);

    let sum = db.orders().sum(field("Total"));
    assert_eq!(db.session.scalar::<f64>(&sum).unwrap(), 175.0);

    let big = db.orders().filter(field("Total").gt(60));
    assert!(db.session.exists(&big).unwrap());
    let huge = db.orders().filter(field("Total").gt(1000));
    assert!(!db.session.exists(&huge).unwrap());
}

#[test]
fn test_single() {
    let mut db = Db::new();
    let found = db.orders().filter(field("Id").eq(2));
    assert_eq!(db.session.single(&found).unwrap().map(|o| o.total), Some(50.0));
    let missing = db.orders().filter(field("Id").eq(99));
    assert_eq!(db.session.single(&missing).unwrap(), None);
}

#[test]
fn test_projected_rows() {
    let mut db = Db::new();
    let q = db
        .customers()
        .order_by(field("Id"))
        .project(new_object([("Id", field("Id")), ("Name", field("Name").to_upper())]));
    let rows: Vec<(i64, String)> = db.session.rows(&q).unwrap();
    assert_eq!(
        rows,
        [(7, "ANN".to_string()), (8, "BO".to_string()), (10, "CY".to_string())]
    );
}

#[test]
fn test_join_on_source_binding() {
    let mut db = Db::new();
    let customers = db.customers();
    let q = db
        .orders()
        .join(&customers, "c", field("CustomerId"), field("Id"))
        .filter(source("c").field("City").eq("Oslo"))
        .project(new_object([("Id", field("Id")), ("Customer", source("c").field("Name"))]));
    let mut rows: Vec<(i64, String)> = db.session.rows(&q).unwrap();
    rows.sort();
    assert_eq!(rows, [(1, "Ann".to_string()), (2, "Ann".to_string())]);
}

#[test]
fn test_group_by_counts() {
    let mut db = Db::new();
    let q = db
        .orders()
        .group_by(field("CustomerId"))
        .project(new_object([
            ("CustomerId", key()),
            ("Orders", count()),
            ("Spent", sum(field("Total"))),
        ]));
    let mut rows: Vec<(i64, i64, f64)> = db.session.rows(&q).unwrap();
    rows.sort_by_key(|r| r.0);
    assert_eq!(rows, [(7, 2, 150.0), (8, 1, 20.0), (9, 1, 5.0)]);
}

#[test]
fn test_table_to_json() {
    let mut db = Db::new();
    let q = db
        .customers()
        .filter(field("Id").eq(8))
        .project(new_object([("Name", field("Name")), ("City", field("City"))]));
    let table = db.session.table(&q).unwrap();
    assert_eq!(table.columns, ["Name", "City"]);
    let json = table.to_json().unwrap();
    assert_eq!(json, serde_json::json!([{ "Name": "Bo", "City": null }]));
}

#[test]
fn test_insert_assigns_identity() {
    let mut db = Db::new();
    let mut order = Order {
        customer_id: 10,
        date: common::at(2024, 6, 1),
        total: 42.5,
        ..Order::default()
    };
    assert_eq!(db.session.insert(&mut order).unwrap(), 1);
    assert_eq!(order.id, 5);

    let stored = db.orders().filter(field("Id").eq(5));
    let stored = db.session.single(&stored).unwrap().unwrap();
    assert_eq!(stored.date, order.date);
    assert_eq!(stored.total, 42.5);
}

#[test]
fn test_update_and_delete_entities() {
    let mut db = Db::new();
    let bo = db.customers().filter(field("Id").eq(8));
    let mut bo = db.session.single(&bo).unwrap().unwrap();
    bo.city = Some("Bergen".into());
    assert_eq!(db.session.update(&bo).unwrap(), 1);

    let in_bergen = db.customers().count_where(field("City").eq("Bergen"));
    assert_eq!(db.session.scalar::<i64>(&in_bergen).unwrap(), 2);

    let gear = Line {
        id: 3,
        ..Line::default()
    };
    assert_eq!(db.session.delete(&gear).unwrap(), 1);
    assert_eq!(db.line_count(), 2);
}

#[test]
fn test_set_based_update_and_delete() {
    let mut db = Db::new();
    let raise = db
        .orders()
        .filter(field("Shipped").not())
        .update_set([("Total", field("Total").mul(2))]);
    assert_eq!(db.session.execute(&raise).unwrap(), 3);

    let sum = db.orders().sum(field("Total"));
    assert_eq!(db.session.scalar::<f64>(&sum).unwrap(), 250.0);

    let purge = db.lines().filter(field("Quantity").gte(10)).delete();
    assert_eq!(db.session.execute(&purge).unwrap(), 2);
}

#[test]
fn test_submit_change_set() {
    let mut db = Db::new();
    let mut first = Line::new(3, "spring", 5);
    let mut second = Line::new(3, "pin", 7);
    let ann = Customer {
        id: 7,
        name: "Anne".into(),
        city: Some("Oslo".into()),
        active: true,
        address_id: Some(1),
        address: None,
    };

    let mut changes = ChangeSet::with_registry(&db.registry);
    changes.insert(&mut first).insert(&mut second).update(&ann);
    assert_eq!(db.session.submit(changes).unwrap(), 3);

    assert_eq!((first.id, second.id), (4, 5));
    assert_eq!(db.line_count(), 5);
    let renamed = db.customers().filter(field("Name").eq("Anne"));
    assert!(db.session.exists(&renamed).unwrap());
}

#[test]
fn test_failed_batch_rolls_back() {
    let mut db = Db::new();
    let mut good = Line::new(1, "ok", 1);
    let mut bad = Line::new(1, "broken", 0);
    let mut after = Line::new(1, "never", 2);

    let mut changes = ChangeSet::with_registry(&db.registry);
    changes.insert(&mut good).insert(&mut bad).insert(&mut after);
    let err = db.session.submit(changes).unwrap_err();

    let command = err.command().expect("execution error names the command");
    assert_eq!(command.params()[1].value, Value::from("broken"));
    assert!(!db.session.in_transaction());
    assert_eq!(db.line_count(), 3);

    let first = db.lines().count_where(field("Product").eq("ok"));
    assert_eq!(db.session.scalar::<i64>(&first).unwrap(), 0);
}

#[test]
fn test_failure_in_a_later_round_trip_rolls_back_earlier_ones() {
    let mut db = Db::with_options(SessionOptions::for_dialect(Dialect::Sqlite).with_batch_size(1));
    let mut good = Line::new(1, "ok", 1);
    let mut bad = Line::new(1, "broken", 0);

    let mut changes = ChangeSet::with_registry(&db.registry);
    changes.insert(&mut good).insert(&mut bad);
    assert!(db.session.submit(changes).is_err());
    assert_eq!(db.line_count(), 3);
}

#[test]
fn test_caller_transaction() {
    let mut db = Db::new();
    db.session.begin_transaction().unwrap();
    let mut line = Line::new(2, "temp", 3);
    db.session.insert(&mut line).unwrap();
    assert_eq!(db.line_count(), 4);
    db.session.rollback().unwrap();
    assert_eq!(db.line_count(), 3);

    db.session.begin_transaction().unwrap();
    let mut kept = Line::new(2, "kept", 3);
    db.session.insert(&mut kept).unwrap();
    db.session.commit().unwrap();
    assert_eq!(db.line_count(), 4);
}

#[test]
fn test_failure_inside_caller_transaction_leaves_it_open() {
    let mut db = Db::new();
    db.session.begin_transaction().unwrap();
    let mut line = Line::new(2, "temp", 3);
    db.session.insert(&mut line).unwrap();

    let mut bad = Line::new(2, "broken", 0);
    assert!(db.session.insert(&mut bad).is_err());
    assert!(db.session.in_transaction());

    db.session.rollback().unwrap();
    assert_eq!(db.line_count(), 3);
}

#[test]
fn test_multiple_result_sets() {
    let mut db = Db::new();
    let count = db.orders().count();
    let customers = db.customers().order_by(field("Id"));
    let names = db
        .customers()
        .order_by(field("Id"))
        .project(new_object([("Name", field("Name"))]));

    let mut reader = db.session.multiple(&[&count, &customers, &names]).unwrap();
    assert_eq!(reader.remaining(), 3);
    assert_eq!(reader.read_scalar::<i64>().unwrap(), 4);
    let customers: Vec<Customer> = reader.read_list().unwrap();
    assert_eq!(customers.len(), 3);
    let names: Vec<(String,)> = reader.read_rows().unwrap();
    assert_eq!(names[2].0, "Cy");
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn test_inline_literals_execute_the_same() {
    let mut db = Db::with_options(SessionOptions::for_dialect(Dialect::Sqlite).with_parameterize(false));
    let q = db
        .orders()
        .filter(field("CustomerId").eq(7).and(field("Notes").is_null()));
    assert_eq!(ids(&db.session.list(&q).unwrap()), [1]);
}

#[test]
fn test_wrong_dialect_is_reported() {
    let registry = registry();
    let mut session = Session::new(seeded(), SessionOptions::for_dialect(Dialect::Postgres))
        .with_registry(Arc::clone(&registry));
    let err = session
        .list(&Query::<Order>::table_in(&registry))
        .unwrap_err();
    assert!(err.command().is_some());
    assert!(err.to_string().contains("postgres"), "{err}");
}
