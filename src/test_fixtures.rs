//! Entity types shared by unit tests.

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::metadata::{Entity, EntityBuilder, MetadataRegistry};

/// A fresh registry, so tests never share described metadata.
pub fn registry() -> Arc<MetadataRegistry> {
    Arc::new(MetadataRegistry::new())
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
        b.column("Name", |c| c.name.clone(), |c, v| c.name = v).size(100);
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
        b.column("Date", |o| o.date, |o, v| o.date = v).scale(3);
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

/// A keyless type; updates and deletes of it are rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditEntry {
    pub message: String,
    pub level: i32,
}

impl Entity for AuditEntry {
    fn describe(b: &mut EntityBuilder<Self>) {
        b.column("Message", |e| e.message.clone(), |e, v| e.message = v);
        b.column("Level", |e| e.level, |e, v| e.level = v);
    }
}
