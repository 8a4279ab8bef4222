//! Orderbook synchronization
//!
//! Ties the order sources (gossip, relays, local creation) to the store.

pub mod orderbook;

use crate::application::validator::Rejection;
use crate::infrastructure::client::RelayError;
use crate::infrastructure::database::DatabaseError;
use thiserror::Error;

pub use orderbook::{IngestStats, OrderSource, OrderbookSync, SyncSettings};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Order rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
