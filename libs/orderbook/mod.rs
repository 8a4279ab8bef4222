//! NFT marketplace orderbook
//!
//! Order intake from gossip, HTTP relays and local creation, validation,
//! deduplication, chain status reconciliation and a local indexed store.

pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used items
pub use application::{
    OrderValidator, OrderbookApp, OrderbookSync, Rejection, StatusReconciler, SyncError,
};
pub use domain::{
    Asset, Direction, Fee, ListingSort, Order, OrderHasher, OrderKind, OrderPage, OrderQuery,
    OrderStatus, SortBy, StoredOrder, UnsignedOrder,
};
pub use infrastructure::{
    init_tracing, GossipChannel, OrderDatabase, OrderRelay, OrderbookConfig, ShutdownManager,
    StatusOracle,
};
