//! Infrastructure Layer
//!
//! Contains implementations of external interfaces (database, relays, chain, gossip).
//! This layer depends on the domain layer but not on the application layer.

pub mod client;
pub mod config;
pub mod database;
pub mod gossip;
pub mod heartbeat;
pub mod logging;
pub mod shutdown;
pub mod signer;

pub use client::{EthersStatusOracle, OracleError, OrderRelay, RelayClient, RelayError, StatusOracle};
pub use config::{ConfigError, OrderbookConfig};
pub use database::{DatabaseError, OrderDatabase};
pub use gossip::{GossipChannel, GossipError, MemoryGossip, WebSocketGossip};
pub use heartbeat::Heartbeat;
pub use logging::{init_tracing, init_tracing_with_level};
pub use shutdown::ShutdownManager;
pub use signer::{OrderSigner, SignerError};
