pub mod models;
pub mod schema;

use crate::domain::encoding::sort_key;
use crate::domain::order::{Order, OrderError, OrderStatus, StoredOrder};
use crate::domain::query::{Direction, OrderPage, OrderQuery, SortBy};
use ethers::types::{Address, H256, U256};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashSet;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

pub use models::{address_key, hash_key, DbOrder};
pub use schema::{get_schema_version, initialize_schema};

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Schema error: {0}")]
    SchemaError(#[from] schema::SchemaError),

    #[error("Corrupt order record: {0}")]
    CorruptRecord(#[from] OrderError),
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Rows per multi-value statement, well under SQLite's bind limit
const BATCH_SIZE: usize = 200;

/// Local order store
///
/// The single shared piece of mutable state: every component reads and writes
/// order status through here. Substantive fields are written once per hash.
#[derive(Clone)]
pub struct OrderDatabase {
    pool: SqlitePool,
}

impl OrderDatabase {
    /// Open (or create) the database and initialize the schema
    pub async fn new(db_url: &str) -> Result<Self> {
        info!("Connecting to database: {}", db_url);

        let in_memory = db_url.contains(":memory:") || db_url.contains("mode=memory");
        let mut options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);

        let pool = if in_memory {
            // Every connection to :memory: is a separate database, keep exactly one alive
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            options = options.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new()
                .max_connections(8)
                .connect_with(options)
                .await?
        };

        schema::initialize_schema(&pool).await?;

        info!("Database initialized successfully");

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ==================== WRITES ====================

    /// Insert orders whose hash is not stored yet. Returns the number inserted.
    pub async fn store_orders(&self, orders: &[Order], status: OrderStatus) -> Result<u64> {
        Ok(self.insert_orders(orders, status).await?.len() as u64)
    }

    /// Insert-if-absent, returning the hashes that were actually inserted.
    ///
    /// All chunks commit in one transaction. Duplicates inside `orders` and
    /// hashes inserted concurrently by another caller are skipped.
    pub async fn insert_orders(&self, orders: &[Order], status: OrderStatus) -> Result<Vec<H256>> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let rows = orders
            .iter()
            .map(|order| DbOrder::from_order(order, status))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::new();

        for chunk in rows.chunks(BATCH_SIZE) {
            let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                r#"INSERT INTO orders (
                    hash, status, seller, sell_token, sell_token_id, ask_token,
                    price_key, expiration_key, body, received_at, last_broadcast_at
                ) "#,
            );

            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(&row.hash)
                    .push_bind(row.status)
                    .push_bind(&row.seller)
                    .push_bind(&row.sell_token)
                    .push_bind(&row.sell_token_id)
                    .push_bind(&row.ask_token)
                    .push_bind(&row.price_key)
                    .push_bind(&row.expiration_key)
                    .push_bind(&row.body)
                    .push_bind(&row.received_at)
                    .push_bind(row.last_broadcast_at);
            });

            query_builder.push(" ON CONFLICT (hash) DO NOTHING RETURNING hash");

            let hashes: Vec<(String,)> = query_builder
                .build_query_as()
                .fetch_all(&mut *tx)
                .await?;

            for (hash,) in hashes {
                inserted.push(parse_hash(&hash)?);
            }
        }

        tx.commit().await?;

        debug!(
            received = orders.len(),
            inserted = inserted.len(),
            status = %status,
            "Stored orders"
        );

        Ok(inserted)
    }

    /// Bulk status transition. Unknown hashes are ignored, and executed or
    /// canceled orders keep their status. Returns the number of rows changed.
    pub async fn set_status(&self, hashes: &[H256], status: OrderStatus) -> Result<u64> {
        if hashes.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut updated = 0;

        for chunk in hashes.chunks(BATCH_SIZE) {
            let mut query_builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("UPDATE orders SET status = ");
            query_builder.push_bind(status.as_i64());
            query_builder.push(" WHERE status NOT IN (");
            query_builder.push_bind(OrderStatus::Closed.as_i64());
            query_builder.push(", ");
            query_builder.push_bind(OrderStatus::Canceled.as_i64());
            query_builder.push(") AND status != ");
            query_builder.push_bind(status.as_i64());
            query_builder.push(" AND hash IN (");
            let mut separated = query_builder.separated(", ");
            for hash in chunk {
                separated.push_bind(hash_key(*hash));
            }
            separated.push_unseparated(")");

            let result = query_builder.build().execute(&mut *tx).await?;
            updated += result.rows_affected();
        }

        tx.commit().await?;

        debug!(
            requested = hashes.len(),
            updated,
            status = %status,
            "Updated order status"
        );

        Ok(updated)
    }

    /// Record that orders were announced on the gossip channel at `at_millis`
    pub async fn mark_broadcast(&self, hashes: &[H256], at_millis: i64) -> Result<u64> {
        if hashes.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut updated = 0;

        for chunk in hashes.chunks(BATCH_SIZE) {
            let mut query_builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("UPDATE orders SET last_broadcast_at = ");
            query_builder.push_bind(at_millis);
            query_builder.push(" WHERE hash IN (");
            let mut separated = query_builder.separated(", ");
            for hash in chunk {
                separated.push_bind(hash_key(*hash));
            }
            separated.push_unseparated(")");

            updated += query_builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    }

    // ==================== READS ====================

    /// Orders of `orders` whose hash is not stored yet, input order preserved
    pub async fn filter_existing(&self, orders: &[Order]) -> Result<Vec<Order>> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let mut existing = HashSet::new();

        for chunk in orders.chunks(BATCH_SIZE) {
            let mut query_builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT hash FROM orders WHERE hash IN (");
            let mut separated = query_builder.separated(", ");
            for order in chunk {
                separated.push_bind(hash_key(order.hash));
            }
            separated.push_unseparated(")");

            let rows: Vec<(String,)> = query_builder
                .build_query_as()
                .fetch_all(&self.pool)
                .await?;
            existing.extend(rows.into_iter().map(|(hash,)| hash));
        }

        Ok(orders
            .iter()
            .filter(|order| !existing.contains(&hash_key(order.hash)))
            .cloned()
            .collect())
    }

    pub async fn get_order(&self, hash: H256) -> Result<Option<StoredOrder>> {
        let row = sqlx::query_as::<_, DbOrder>("SELECT * FROM orders WHERE hash = ?")
            .bind(hash_key(hash))
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row.into_stored().map_err(DatabaseError::from))
            .transpose()
    }

    /// The open listing for one token; the lowest ask wins when a token is
    /// listed more than once.
    pub async fn get_order_for_token(
        &self,
        collection: Address,
        token_id: U256,
    ) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, DbOrder>(
            r#"
            SELECT * FROM orders
            WHERE status = ? AND sell_token = ? AND sell_token_id = ?
            ORDER BY price_key ASC, hash ASC
            LIMIT 1
            "#,
        )
        .bind(OrderStatus::Open.as_i64())
        .bind(address_key(collection))
        .bind(sort_key(token_id))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.order().map_err(DatabaseError::from))
            .transpose()
    }

    /// One page of listings matching `query`.
    ///
    /// Each token appears at most once (its lowest-ask order in the requested
    /// status), so `total` counts distinct tokens and consecutive pages never
    /// repeat or skip a listing.
    pub async fn query_orders(&self, query: &OrderQuery) -> Result<OrderPage> {
        let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new("");
        push_listing_page(&mut query_builder, query);
        let rows: Vec<DbOrder> = query_builder.build_query_as().fetch_all(&self.pool).await?;

        let mut count_builder: QueryBuilder<Sqlite> = QueryBuilder::new("");
        push_listings(&mut count_builder, query, "COUNT(*)");
        let (total,): (i64,) = count_builder.build_query_as().fetch_one(&self.pool).await?;

        let orders = rows
            .iter()
            .map(DbOrder::order)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(
            status = %query.status,
            returned = orders.len(),
            total,
            "Queried orders"
        );

        Ok(OrderPage {
            orders,
            total: total.max(0) as u64,
        })
    }

    pub async fn orders_by_seller(&self, seller: Address) -> Result<Vec<StoredOrder>> {
        let rows = sqlx::query_as::<_, DbOrder>(
            "SELECT * FROM orders WHERE seller = ? ORDER BY expiration_key DESC, hash ASC",
        )
        .bind(address_key(seller))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.into_stored().map_err(DatabaseError::from))
            .collect()
    }

    /// Keyset iteration over open orders by hash, starting after `after`
    pub async fn open_orders_page(&self, after: Option<H256>, limit: u64) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, DbOrder>(
            r#"
            SELECT * FROM orders
            WHERE status = ? AND hash > ?
            ORDER BY hash ASC
            LIMIT ?
            "#,
        )
        .bind(OrderStatus::Open.as_i64())
        .bind(after.map(hash_key).unwrap_or_default())
        .bind(clamp_i64(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.order().map_err(DatabaseError::from))
            .collect()
    }

    /// Open orders not announced since `before_millis`, oldest announcement first
    pub async fn orders_due_for_broadcast(
        &self,
        before_millis: i64,
        limit: u64,
    ) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, DbOrder>(
            r#"
            SELECT * FROM orders
            WHERE status = ? AND (last_broadcast_at IS NULL OR last_broadcast_at < ?)
            ORDER BY COALESCE(last_broadcast_at, 0) ASC, hash ASC
            LIMIT ?
            "#,
        )
        .bind(OrderStatus::Open.as_i64())
        .bind(before_millis)
        .bind(clamp_i64(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.order().map_err(DatabaseError::from))
            .collect()
    }

    pub async fn count_by_status(&self, status: OrderStatus) -> Result<u64> {
        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM orders WHERE status = ?")
            .bind(status.as_i64())
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    /// Get total number of stored orders
    pub async fn order_count(&self) -> Result<u64> {
        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }
}

fn sort_column(sort_by: SortBy) -> &'static str {
    match sort_by {
        SortBy::Price => "price_key",
        SortBy::Expiration => "expiration_key",
    }
}

fn sort_index(sort_by: SortBy) -> &'static str {
    match sort_by {
        SortBy::Price => "idx_orders_status_price",
        SortBy::Expiration => "idx_orders_status_expiration",
    }
}

/// Listings in the requested status (and collection), walked in sort-index
/// order. A row is the token's listing when no cheaper order for the same
/// token exists in that status, ties going to the lower hash. The range start
/// applies after that, so a cheap order below `from` still hides its pricier
/// siblings.
fn push_listings(builder: &mut QueryBuilder<Sqlite>, query: &OrderQuery, columns: &str) {
    builder.push(format!(
        "SELECT {columns} FROM orders o INDEXED BY {} WHERE o.status = ",
        sort_index(query.sort_by)
    ));
    builder.push_bind(query.status.as_i64());
    if let Some(collection) = query.collection {
        builder.push(" AND o.sell_token = ");
        builder.push_bind(address_key(collection));
    }
    if let Some(from) = query.from {
        let comparison = match query.direction {
            Direction::Asc => ">=",
            Direction::Desc => "<=",
        };
        builder.push(format!(" AND o.{} {} ", sort_column(query.sort_by), comparison));
        builder.push_bind(sort_key(from));
    }
    builder.push(
        r#"
        AND NOT EXISTS (
            SELECT 1 FROM orders c
            WHERE c.status = o.status
              AND c.sell_token = o.sell_token
              AND c.sell_token_id = o.sell_token_id
              AND (c.price_key < o.price_key OR (c.price_key = o.price_key AND c.hash < o.hash))
        )"#,
    );
}

fn push_listing_page(builder: &mut QueryBuilder<Sqlite>, query: &OrderQuery) {
    let direction = query.direction.as_sql();

    push_listings(builder, query, "o.*");
    builder.push(format!(
        " ORDER BY o.{} {direction}, o.hash {direction} LIMIT ",
        sort_column(query.sort_by)
    ));
    builder.push_bind(clamp_i64(query.limit));
    builder.push(" OFFSET ");
    builder.push_bind(clamp_i64(query.offset));
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn parse_hash(value: &str) -> Result<H256> {
    H256::from_str(value).map_err(|e| {
        DatabaseError::CorruptRecord(OrderError::InvalidField {
            field: "hash",
            reason: e.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query::ListingSort;
    use sqlx::Row;

    async fn plan(database: &OrderDatabase, query: &OrderQuery) -> Vec<String> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("EXPLAIN QUERY PLAN ");
        push_listing_page(&mut builder, query);
        builder
            .build()
            .fetch_all(&database.pool)
            .await
            .unwrap()
            .iter()
            .map(|row| row.get::<String, _>("detail"))
            .collect()
    }

    #[tokio::test]
    async fn test_listing_pages_walk_the_sort_index() {
        let database = OrderDatabase::new("sqlite::memory:").await.unwrap();
        let collection = Address::repeat_byte(0xaa);

        let cases = [
            (OrderQuery::open(), "idx_orders_status_price"),
            (OrderQuery::open().in_collection(collection), "idx_orders_status_price"),
            (
                OrderQuery::open()
                    .sorted(ListingSort::HighLowPrice)
                    .starting_from(U256::from(1000)),
                "idx_orders_status_price",
            ),
            (
                OrderQuery::open().sorted(ListingSort::RecentListing),
                "idx_orders_status_expiration",
            ),
        ];

        for (query, index) in cases {
            let details = plan(&database, &query).await;
            assert!(
                details.iter().any(|detail| detail.contains(index)),
                "{:?} not served by {}: {:?}",
                query,
                index,
                details
            );
            // The sibling check is a point lookup, never a scan
            assert!(
                details.iter().any(|detail| detail.contains("idx_orders_status_token")),
                "{:?}",
                details
            );
        }
    }
}
