//! Integration tests for the SQLite order store
//!
//! Insert-if-absent, listing queries and status transitions.

mod common;

use common::fixtures::listing;
use common::{collection, memory_db, other_collection, other_seller, seller, unit};
use ethers::types::{H256, U256};
use orderbook::domain::{ListingSort, Order, OrderQuery, OrderStatus};
use orderbook::infrastructure::database::get_schema_version;
use orderbook::infrastructure::OrderDatabase;

/// Macro for verbose test output
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

fn price(tenths: u64) -> U256 {
    unit() / U256::from(10) * U256::from(tenths)
}

fn hashes(orders: &[Order]) -> Vec<H256> {
    orders.iter().map(|order| order.hash).collect()
}

#[tokio::test]
async fn test_store_is_insert_if_absent() {
    let db = memory_db().await;
    let order = listing(&seller(), collection(), 1, unit(), 1).await;

    assert_eq!(db.store_orders(&[order.clone()], OrderStatus::Open).await.unwrap(), 1);
    assert_eq!(db.store_orders(&[order.clone()], OrderStatus::Closed).await.unwrap(), 0);

    assert_eq!(db.order_count().await.unwrap(), 1);
    let stored = db.get_order(order.hash).await.unwrap().unwrap();
    assert_eq!(stored.order, order);
    assert_eq!(stored.status, OrderStatus::Open);
}

#[tokio::test]
async fn test_overlapping_concurrent_stores_insert_once() {
    let db = memory_db().await;
    let mut orders = Vec::new();
    for token in 0..6u64 {
        orders.push(listing(&seller(), collection(), token, price(token + 1), token).await);
    }

    let first = orders[..4].to_vec();
    let second = orders[2..].to_vec();
    let (a, b) = tokio::join!(
        db.store_orders(&first, OrderStatus::Open),
        db.store_orders(&second, OrderStatus::Open)
    );

    assert_eq!(a.unwrap() + b.unwrap(), 6);
    assert_eq!(db.order_count().await.unwrap(), 6);
}

#[tokio::test]
async fn test_duplicates_within_one_batch() {
    let db = memory_db().await;
    let order = listing(&seller(), collection(), 1, unit(), 1).await;

    let inserted = db
        .insert_orders(&[order.clone(), order.clone()], OrderStatus::Open)
        .await
        .unwrap();

    assert_eq!(inserted, vec![order.hash]);
    assert!(db.filter_existing(&[order]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pagination_is_complete_and_sorted() {
    let db = memory_db().await;
    let mut orders = Vec::new();
    // Prices deliberately out of token order
    for (token, tenths) in [(1u64, 7u64), (2, 3), (3, 9), (4, 1), (5, 5), (6, 8), (7, 2)] {
        orders.push(listing(&seller(), collection(), token, price(tenths), token).await);
    }
    let noise = listing(&seller(), other_collection(), 1, price(4), 100).await;
    orders.push(noise);
    db.store_orders(&orders, OrderStatus::Open).await.unwrap();

    let mut seen = Vec::new();
    let mut offset = 0;
    loop {
        let page = db
            .query_orders(&OrderQuery::open().in_collection(collection()).page(offset, 3))
            .await
            .unwrap();
        assert_eq!(page.total, 7);
        verbose_println!("offset {} -> {} orders", offset, page.orders.len());
        if page.orders.is_empty() {
            break;
        }
        offset += page.orders.len() as u64;
        seen.extend(page.orders);
    }

    let prices: Vec<U256> = seen.iter().map(|order| order.ask.amount_or_id).collect();
    let expected: Vec<U256> = [1u64, 2, 3, 5, 7, 8, 9].into_iter().map(price).collect();
    assert_eq!(prices, expected);
    assert!(seen.iter().all(|order| order.collection() == collection()));
}

#[tokio::test]
async fn test_query_skips_relisted_tokens_and_other_collections() {
    let db = memory_db().await;
    let orders = vec![
        listing(&seller(), collection(), 1, price(5), 1).await,
        listing(&seller(), collection(), 1, price(3), 2).await,
        listing(&seller(), collection(), 2, price(4), 3).await,
        listing(&seller(), collection(), 3, price(10), 4).await,
        listing(&seller(), other_collection(), 1, price(1), 5).await,
    ];
    db.store_orders(&orders, OrderStatus::Open).await.unwrap();

    let page = db
        .query_orders(&OrderQuery::open().in_collection(collection()).page(0, 2))
        .await
        .unwrap();

    assert_eq!(hashes(&page.orders), vec![orders[1].hash, orders[2].hash]);
    assert_eq!(page.total, 3);

    let everything = db.query_orders(&OrderQuery::open().page(0, 10)).await.unwrap();
    assert_eq!(everything.total, 4);
    assert_eq!(everything.orders[0].hash, orders[4].hash);
}

#[tokio::test]
async fn test_query_sorts_descending_and_by_recency() {
    let db = memory_db().await;
    let orders = vec![
        listing(&seller(), collection(), 1, price(2), 10).await,
        listing(&seller(), collection(), 2, price(6), 20).await,
        listing(&seller(), collection(), 3, price(4), 30).await,
    ];
    db.store_orders(&orders, OrderStatus::Open).await.unwrap();

    let high_low = db
        .query_orders(&OrderQuery::open().sorted(ListingSort::HighLowPrice))
        .await
        .unwrap();
    assert_eq!(
        hashes(&high_low.orders),
        vec![orders[1].hash, orders[2].hash, orders[0].hash]
    );

    // Larger salt means a later expiration in the fixtures
    let recent = db
        .query_orders(&OrderQuery::open().sorted(ListingSort::RecentListing))
        .await
        .unwrap();
    assert_eq!(
        hashes(&recent.orders),
        vec![orders[2].hash, orders[1].hash, orders[0].hash]
    );
}

#[tokio::test]
async fn test_query_range_start() {
    let db = memory_db().await;
    let orders = vec![
        listing(&seller(), collection(), 1, price(3), 1).await,
        listing(&seller(), collection(), 2, price(4), 2).await,
        listing(&seller(), collection(), 3, price(10), 3).await,
    ];
    db.store_orders(&orders, OrderStatus::Open).await.unwrap();

    let floor = db
        .query_orders(&OrderQuery::open().starting_from(price(4)))
        .await
        .unwrap();
    assert_eq!(hashes(&floor.orders), vec![orders[1].hash, orders[2].hash]);
    assert_eq!(floor.total, 2);

    let ceiling = db
        .query_orders(
            &OrderQuery::open()
                .sorted(ListingSort::HighLowPrice)
                .starting_from(price(4)),
        )
        .await
        .unwrap();
    assert_eq!(hashes(&ceiling.orders), vec![orders[1].hash, orders[0].hash]);
    assert_eq!(ceiling.total, 2);
}

#[tokio::test]
async fn test_order_for_token_prefers_lowest_ask() {
    let db = memory_db().await;
    let pricey = listing(&seller(), collection(), 5, price(9), 1).await;
    let cheap = listing(&other_seller(), collection(), 5, price(6), 2).await;
    db.store_orders(&[pricey.clone(), cheap.clone()], OrderStatus::Open)
        .await
        .unwrap();

    let found = db.get_order_for_token(collection(), U256::from(5)).await.unwrap();
    assert_eq!(found, Some(cheap.clone()));

    db.set_status(&[cheap.hash], OrderStatus::Canceled).await.unwrap();
    let found = db.get_order_for_token(collection(), U256::from(5)).await.unwrap();
    assert_eq!(found, Some(pricey));

    assert_eq!(
        db.get_order_for_token(other_collection(), U256::from(5)).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_status_transitions() {
    let db = memory_db().await;
    let executed = listing(&seller(), collection(), 1, unit(), 1).await;
    let transferred = listing(&seller(), collection(), 2, unit(), 2).await;
    db.store_orders(&[executed.clone(), transferred.clone()], OrderStatus::Open)
        .await
        .unwrap();

    assert_eq!(db.set_status(&[], OrderStatus::Closed).await.unwrap(), 0);
    assert_eq!(
        db.set_status(&[H256::repeat_byte(0x77)], OrderStatus::Closed).await.unwrap(),
        0
    );

    assert_eq!(db.set_status(&[executed.hash], OrderStatus::Closed).await.unwrap(), 1);
    // Terminal: never reopened or relabeled
    assert_eq!(db.set_status(&[executed.hash], OrderStatus::Open).await.unwrap(), 0);
    assert_eq!(db.set_status(&[executed.hash], OrderStatus::BadOwner).await.unwrap(), 0);

    // Not terminal: a token can come back to its seller
    assert_eq!(db.set_status(&[transferred.hash], OrderStatus::BadOwner).await.unwrap(), 1);
    assert_eq!(db.set_status(&[transferred.hash], OrderStatus::Open).await.unwrap(), 1);

    assert_eq!(db.count_by_status(OrderStatus::Closed).await.unwrap(), 1);
    assert_eq!(db.count_by_status(OrderStatus::Open).await.unwrap(), 1);

    let closed = db
        .query_orders(&OrderQuery {
            status: OrderStatus::Closed,
            ..OrderQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(hashes(&closed.orders), vec![executed.hash]);
}

#[tokio::test]
async fn test_orders_by_seller() {
    let db = memory_db().await;
    let mine = listing(&seller(), collection(), 1, unit(), 1).await;
    let theirs = listing(&other_seller(), collection(), 2, unit(), 2).await;
    db.store_orders(&[mine.clone(), theirs], OrderStatus::Open).await.unwrap();

    let stored = db.orders_by_seller(seller().address()).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].order, mine);
}

#[tokio::test]
async fn test_open_orders_page_walks_by_hash() {
    let db = memory_db().await;
    let mut orders = Vec::new();
    for token in 0..5u64 {
        orders.push(listing(&seller(), collection(), token, unit(), token).await);
    }
    db.store_orders(&orders, OrderStatus::Open).await.unwrap();
    db.set_status(&[orders[0].hash], OrderStatus::Canceled).await.unwrap();

    let mut walked = Vec::new();
    let mut after = None;
    loop {
        let page = db.open_orders_page(after, 2).await.unwrap();
        let Some(last) = page.last() else { break };
        after = Some(last.hash);
        walked.extend(hashes(&page));
    }

    let mut expected = hashes(&orders[1..]);
    expected.sort();
    assert_eq!(walked, expected);
}

#[tokio::test]
async fn test_broadcast_bookkeeping() {
    let db = memory_db().await;
    let order = listing(&seller(), collection(), 1, unit(), 1).await;
    db.store_orders(&[order.clone()], OrderStatus::Open).await.unwrap();

    let due = db.orders_due_for_broadcast(1_000, 10).await.unwrap();
    assert_eq!(hashes(&due), vec![order.hash]);

    db.mark_broadcast(&[order.hash], 5_000).await.unwrap();
    assert!(db.orders_due_for_broadcast(5_000, 10).await.unwrap().is_empty());
    assert_eq!(db.orders_due_for_broadcast(5_001, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_file_database_persists() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("orders.db").display());
    let order = listing(&seller(), collection(), 1, unit(), 1).await;

    {
        let db = OrderDatabase::new(&url).await.unwrap();
        db.store_orders(&[order.clone()], OrderStatus::Open).await.unwrap();
        db.close().await;
    }

    let db = OrderDatabase::new(&url).await.unwrap();
    assert_eq!(db.get_order(order.hash).await.unwrap().unwrap().order, order);
}

#[tokio::test]
async fn test_schema_version_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("schema.db").display());
    let db = OrderDatabase::new(&url).await.unwrap();
    db.close().await;

    let pool = sqlx::SqlitePool::connect(&url).await.unwrap();
    assert_eq!(get_schema_version(&pool).await.unwrap(), Some(1));
}
