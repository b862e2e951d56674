//! Shared fixture entities and a seeded SQLite database.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use quarry::exec::SqliteConnection;
use quarry::metadata::{Entity, EntityBuilder, MetadataRegistry};

pub fn registry() -> Arc<MetadataRegistry> {
    Arc::new(MetadataRegistry::new())
}

pub fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(10, 0, 0))
        .unwrap()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Address {
    pub id: i64,
    pub street: String,
    pub city: String,
}

impl Entity for Address {
    fn describe(b: &mut EntityBuilder<Self>) {
        b.table("Addresses");
        b.key("Id", |a| a.id, |a, v| a.id = v);
        b.column("Street", |a| a.street.clone(), |a, v| a.street = v);
        b.column("City", |a| a.city.clone(), |a, v| a.city = v);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub city: Option<String>,
    pub active: bool,
    pub address_id: Option<i64>,
    pub address: Option<Address>,
}

impl Entity for Customer {
    fn describe(b: &mut EntityBuilder<Self>) {
        b.table("Customers");
        b.key("Id", |c| c.id, |c, v| c.id = v);
        b.column("Name", |c| c.name.clone(), |c, v| c.name = v);
        b.column("City", |c| c.city.clone(), |c, v| c.city = v);
        b.column("Active", |c| c.active, |c, v| c.active = v);
        b.column("AddressId", |c| c.address_id, |c, v| c.address_id = v);
        b.has_one::<Address>("Address", &["AddressId"], &["Id"], |c, a| c.address = Some(a));
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub date: NaiveDateTime,
    pub total: f64,
    pub notes: Option<String>,
    pub shipped: bool,
    pub customer: Option<Customer>,
    pub lines: Vec<Line>,
}

impl Entity for Order {
    fn describe(b: &mut EntityBuilder<Self>) {
        b.table("Orders");
        b.key("Id", |o| o.id, |o, v| o.id = v).identity();
        b.column("CustomerId", |o| o.customer_id, |o, v| o.customer_id = v);
        b.column("Date", |o| o.date, |o, v| o.date = v);
        b.column("Total", |o| o.total, |o, v| o.total = v);
        b.column("Notes", |o| o.notes.clone(), |o, v| o.notes = v);
        b.column("Shipped", |o| o.shipped, |o, v| o.shipped = v);
        b.has_one::<Customer>("Customer", &["CustomerId"], &["Id"], |o, c| o.customer = Some(c));
        b.has_many::<Line>("Lines", &["Id"], &["OrderId"], |o, l| o.lines.push(l));
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Line {
    pub id: i64,
    pub order_id: i64,
    pub product: String,
    pub quantity: i32,
    pub price: f64,
}

impl Line {
    pub fn new(order_id: i64, product: &str, quantity: i32) -> Self {
        Self {
            order_id,
            product: product.to_string(),
            quantity,
            price: 1.5,
            ..Self::default()
        }
    }
}

impl Entity for Line {
    fn describe(b: &mut EntityBuilder<Self>) {
        b.table("OrderLines");
        b.key("Id", |l| l.id, |l, v| l.id = v).identity();
        b.column("OrderId", |l| l.order_id, |l, v| l.order_id = v);
        b.column("Product", |l| l.product.clone(), |l, v| l.product = v);
        b.column("Quantity", |l| l.quantity, |l, v| l.quantity = v);
        b.column("Price", |l| l.price, |l, v| l.price = v);
    }
}

pub const SCHEMA: &str = "
CREATE TABLE Addresses (
    Id INTEGER PRIMARY KEY,
    Street TEXT NOT NULL,
    City TEXT NOT NULL
);
CREATE TABLE Customers (
    Id INTEGER PRIMARY KEY,
    Name TEXT NOT NULL,
    City TEXT,
    Active INTEGER NOT NULL,
    AddressId INTEGER REFERENCES Addresses (Id)
);
CREATE TABLE Orders (
    Id INTEGER PRIMARY KEY AUTOINCREMENT,
    CustomerId INTEGER NOT NULL,
    Date TEXT NOT NULL,
    Total REAL NOT NULL,
    Notes TEXT,
    Shipped INTEGER NOT NULL
);
CREATE TABLE OrderLines (
    Id INTEGER PRIMARY KEY AUTOINCREMENT,
    OrderId INTEGER NOT NULL,
    Product TEXT NOT NULL,
    Quantity INTEGER NOT NULL CHECK (Quantity > 0),
    Price REAL NOT NULL
);
";

/// Three customers, four orders (the last one without a customer row) and
/// three order lines.
pub const SEED: &str = "
INSERT INTO Addresses VALUES (1, 'Main St 1', 'Oslo');
INSERT INTO Customers VALUES (7, 'Ann', 'Oslo', 1, 1);
INSERT INTO Customers VALUES (8, 'Bo', NULL, 0, NULL);
INSERT INTO Customers VALUES (10, 'Cy', 'Bergen', 1, NULL);
INSERT INTO Orders VALUES (1, 7, '2024-01-01 10:00:00.000', 100.0, NULL, 1);
INSERT INTO Orders VALUES (2, 7, '2024-02-01 10:00:00.000', 50.0, 'rush', 0);
INSERT INTO Orders VALUES (3, 8, '2024-03-01 10:00:00.000', 20.0, NULL, 0);
INSERT INTO Orders VALUES (4, 9, '2024-03-05 10:00:00.000', 5.0, NULL, 0);
INSERT INTO OrderLines VALUES (1, 1, 'bolt', 10, 0.5);
INSERT INTO OrderLines VALUES (2, 1, 'nut', 20, 0.25);
INSERT INTO OrderLines VALUES (3, 2, 'gear', 1, 12.0);
";

pub fn seeded() -> SqliteConnection {
    let conn = SqliteConnection::open_in_memory().unwrap();
    conn.execute_script(SCHEMA).unwrap();
    conn.execute_script(SEED).unwrap();
    conn
}
