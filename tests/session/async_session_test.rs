#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use quarry::prelude::*;

use common::{registry, seeded, Customer, Line, Order};

fn session(registry: &Arc<MetadataRegistry>) -> AsyncSession<AsyncSqliteConnection> {
    AsyncSession::new(
        AsyncSqliteConnection::new(seeded()),
        SessionOptions::for_dialect(Dialect::Sqlite),
    )
    .with_registry(Arc::clone(registry))
}

#[tokio::test]
async fn test_list_with_include() {
    let registry = registry();
    let mut session = session(&registry);
    let q = Query::<Order>::table_in(&registry)
        .filter(field("CustomerId").eq(7))
        .order_by(field("Id"))
        .include("Customer")
        .unwrap();

    let orders = session.list(&q).await.unwrap();
    assert_eq!(orders.len(), 2);
    assert!(orders
        .iter()
        .all(|o| o.customer.as_ref().map(|c| c.name.as_str()) == Some("Ann")));
}

#[tokio::test]
async fn test_scalar_and_exists() {
    let registry = registry();
    let mut session = session(&registry);
    let orders = Query::<Order>::table_in(&registry);

    assert_eq!(session.scalar::<i64>(&orders.count()).await.unwrap(), 4);
    assert!(session.exists(&orders.filter(field("Notes").eq("rush"))).await.unwrap());
}

#[tokio::test]
async fn test_insert_assigns_identity() {
    let registry = registry();
    let mut session = session(&registry);
    let mut line = Line::new(2, "cog", 3);
    assert_eq!(session.insert(&mut line).await.unwrap(), 1);
    assert_eq!(line.id, 4);
}

#[tokio::test]
async fn test_failed_batch_rolls_back() {
    let registry = registry();
    let mut session = session(&registry);
    let mut good = Line::new(1, "ok", 1);
    let mut bad = Line::new(1, "broken", 0);

    let mut changes = ChangeSet::with_registry(&registry);
    changes.insert(&mut good).insert(&mut bad);
    let err = session.submit(changes).await.unwrap_err();
    assert!(err.command().is_some());

    let count = Query::<Line>::table_in(&registry).count();
    assert_eq!(session.scalar::<i64>(&count).await.unwrap(), 3);
}

#[tokio::test]
async fn test_multiple_and_transaction() {
    let registry = registry();
    let mut session = session(&registry);
    let customers = Query::<Customer>::table_in(&registry).order_by(field("Id"));
    let count = Query::<Line>::table_in(&registry).count();

    session.begin_transaction().await.unwrap();
    let purge = Query::<Line>::table_in(&registry).delete();
    assert_eq!(session.execute(&purge).await.unwrap(), 3);

    let mut reader = session.multiple(&[&customers, &count]).await.unwrap();
    let listed: Vec<Customer> = reader.read_list().unwrap();
    assert_eq!(listed.len(), 3);
    assert_eq!(reader.read_scalar::<i64>().unwrap(), 0);

    session.rollback().await.unwrap();
    assert_eq!(session.scalar::<i64>(&count).await.unwrap(), 3);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_sessions_run_on_spawned_tasks() {
    let registry = registry();
    let mut session = session(&registry);
    let query = Query::<Order>::table_in(&registry).filter(field("Shipped"));
    let shipped = tokio::spawn(async move { session.list(&query).await })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(shipped.len(), 1);
    assert_eq!(shipped[0].id, 1);
}
