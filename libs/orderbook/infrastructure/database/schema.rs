use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, SchemaError>;

/// Database schema version
///
/// There are no migrations: a version bump means rebuilding the local store.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    // One row per order hash. Integers that exceed 64 bits live in the
    // zero-padded *_key columns so that text order equals numeric order.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            hash TEXT PRIMARY KEY,
            status INTEGER NOT NULL,
            seller TEXT NOT NULL,
            sell_token TEXT NOT NULL,
            sell_token_id TEXT NOT NULL,
            ask_token TEXT NOT NULL,
            price_key TEXT NOT NULL,
            expiration_key TEXT NOT NULL,
            body TEXT NOT NULL,
            received_at TEXT NOT NULL,
            last_broadcast_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Open listings sorted by price, optionally within one collection
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_orders_status_price ON orders(status, price_key, sell_token)",
    )
    .execute(pool)
    .await?;

    // Open listings sorted by expiration (listing recency)
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_orders_status_expiration ON orders(status, expiration_key, sell_token)",
    )
    .execute(pool)
    .await?;

    // Point lookup of the listing for one token
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_orders_status_token ON orders(status, sell_token, sell_token_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_seller ON orders(seller)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO schema_version (version, applied_at) VALUES (?, datetime('now')) ON CONFLICT DO NOTHING",
    )
    .bind(SCHEMA_VERSION)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get current schema version
pub async fn get_schema_version(pool: &SqlitePool) -> Result<Option<i32>> {
    let row = sqlx::query_as::<_, (i32,)>(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(version,)| version))
}
