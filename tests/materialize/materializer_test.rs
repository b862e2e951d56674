#[path = "../common/mod.rs"]
mod common;

use quarry::exec::{BufferedCursor, ResultSet};
use quarry::materialize::Materializer;
use quarry::prelude::*;

use common::{registry, Order};

#[derive(Debug, Clone, Default, PartialEq)]
struct Person {
    id: i64,
    name: String,
}

impl Entity for Person {
    fn describe(b: &mut EntityBuilder<Self>) {
        b.table("People");
        b.key("Id", |p| p.id, |p, v| p.id = v);
        b.column("Name", |p| p.name.clone(), |p, v| p.name = v);
    }
}

fn command<T: 'static>(query: &Query<T>) -> Command {
    query.to_command(CompileOptions::new(Dialect::Sqlite)).unwrap()
}

fn result_set(command: &Command) -> ResultSet {
    ResultSet::new(command.columns().iter().map(|c| c.name.clone()))
}

/// A row for `command` with root members taken from `root`, every
/// navigation column NULL.
fn root_row(command: &Command, root: &[(&str, Value)]) -> Vec<Value> {
    command
        .columns()
        .iter()
        .map(|binding| {
            binding
                .field
                .as_deref()
                .and_then(|f| root.iter().find(|(name, _)| *name == f))
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Null)
        })
        .collect()
}

fn order_row(command: &Command, id: i64, customer_id: i64) -> Vec<Value> {
    root_row(
        command,
        &[
            ("Id", Value::Int(id)),
            ("CustomerId", Value::Int(customer_id)),
            ("Date", Value::Text("2024-01-01 10:00:00".into())),
            ("Total", Value::Float(10.0)),
            ("Shipped", Value::Int(0)),
        ],
    )
}

/// Fill the columns of navigation `index` and mark it present.
fn with_nav(command: &Command, mut row: Vec<Value>, index: usize, values: &[Value]) -> Vec<Value> {
    let nav = &command.navigations()[index];
    assert_eq!(values.len(), nav.field_count);
    for (offset, value) in values.iter().enumerate() {
        row[nav.start + offset] = value.clone();
    }
    row[nav.sentinel] = Value::Int(1);
    row
}

#[test]
fn test_rows_become_entities_in_order() {
    let command = command(&Query::<Person>::table_in(&registry()));
    let set = ["Ann", "Bo", "Cy"]
        .iter()
        .enumerate()
        .fold(result_set(&command), |set, (i, name)| {
            set.with_row([Value::Int(i as i64 + 1), Value::from(*name)])
        });
    let mut cursor = BufferedCursor::single(set);

    let people: Vec<Person> = Materializer::new(&command).read_entities(&mut cursor).unwrap();
    let expected: Vec<_> = [(1, "Ann"), (2, "Bo"), (3, "Cy")]
        .into_iter()
        .map(|(id, name)| Person {
            id,
            name: name.into(),
        })
        .collect();
    assert_eq!(people, expected);
}

#[test]
fn test_null_sentinel_leaves_reference_empty() {
    let query = Query::<Order>::table_in(&registry())
        .include("Customer.Address")
        .unwrap();
    let command = command(&query);

    let missing = order_row(&command, 4, 9);
    let present = with_nav(
        &command,
        order_row(&command, 1, 7),
        0,
        &[
            Value::Int(7),
            Value::from("Ann"),
            Value::Null,
            Value::Int(1),
            Value::Null,
        ],
    );
    let set = result_set(&command).with_row(missing).with_row(present);
    let mut cursor = BufferedCursor::single(set);

    let orders: Vec<Order> = Materializer::new(&command).read_entities(&mut cursor).unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].customer, None);

    let customer = orders[1].customer.as_ref().unwrap();
    assert_eq!(customer.name, "Ann");
    assert!(customer.active);
    assert_eq!(customer.city, None);
    // Customer present, address sentinel NULL
    assert_eq!(customer.address, None);
}

#[test]
fn test_collection_rows_group_under_their_root() {
    let query = Query::<Order>::table_in(&registry()).include("Lines").unwrap();
    let command = command(&query);
    let line = |id: i64, product: &str| {
        [
            Value::Int(id),
            Value::Int(1),
            Value::from(product),
            Value::Int(2),
            Value::Float(1.0),
        ]
    };

    let set = result_set(&command)
        .with_row(with_nav(&command, order_row(&command, 1, 7), 0, &line(1, "bolt")))
        .with_row(with_nav(&command, order_row(&command, 1, 7), 0, &line(2, "nut")))
        .with_row(with_nav(&command, order_row(&command, 1, 7), 0, &line(2, "nut")))
        .with_row(order_row(&command, 2, 7));
    let mut cursor = BufferedCursor::single(set);

    let orders: Vec<Order> = Materializer::new(&command).read_entities(&mut cursor).unwrap();
    assert_eq!(orders.len(), 2);
    let products: Vec<_> = orders[0].lines.iter().map(|l| l.product.as_str()).collect();
    assert_eq!(products, ["bolt", "nut"]);
    assert!(orders[1].lines.is_empty());
}

#[test]
fn test_mapping_error_carries_row() {
    let command = command(&Query::<Person>::table_in(&registry()));
    let set = result_set(&command).with_row([Value::from("seven"), Value::from("Ann")]);
    let mut cursor = BufferedCursor::single(set);

    let err = Materializer::new(&command)
        .read_entities::<Person>(&mut cursor)
        .unwrap_err();
    match err {
        QuarryError::Mapping { row, .. } => {
            assert_eq!(row, [Value::from("seven"), Value::from("Ann")]);
        }
        other => panic!("expected a mapping error, got {other:?}"),
    }
}

#[test]
fn test_projected_rows_and_table() {
    let query = Query::<Person>::table_in(&registry())
        .project(new_object([("Name", field("Name")), ("Id", field("Id"))]));
    let command = command(&query);
    let set = result_set(&command)
        .with_row([Value::from("Ann"), Value::Int(1)])
        .with_row([Value::from("Bo"), Value::Int(2)]);

    let rows: Vec<(String, i64)> = Materializer::new(&command)
        .read_rows(&mut BufferedCursor::single(set.clone()))
        .unwrap();
    assert_eq!(rows, [("Ann".to_string(), 1), ("Bo".to_string(), 2)]);

    let table = Materializer::new(&command)
        .read_table(&mut BufferedCursor::single(set))
        .unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(1, "Name"), Some(&Value::from("Bo")));
    let json = table.to_json().unwrap();
    assert_eq!(json[0]["Id"], 1);
}
