//! Gossip transports
//!
//! Best-effort pub/sub among peers: no delivery or ordering guarantee, and
//! duplicates are expected. Consumers filter payloads themselves.

pub mod memory;
pub mod websocket;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

pub use memory::MemoryGossip;
pub use websocket::WebSocketGossip;

#[derive(Error, Debug)]
pub enum GossipError {
    #[error("Gossip channel closed")]
    Closed,

    #[error("Gossip relay not connected")]
    NotConnected,

    #[error("Gossip outbox full")]
    QueueFull,

    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

pub type Result<T> = std::result::Result<T, GossipError>;

/// Raw JSON pub/sub on a single topic
#[async_trait]
pub trait GossipChannel: Send + Sync {
    /// Every payload seen on the topic from now on
    fn subscribe(&self) -> broadcast::Receiver<Value>;

    /// Best-effort broadcast of one payload. `Ok` means the payload left
    /// (or was handed to a live connection), not that anyone received it.
    async fn publish(&self, payload: Value) -> Result<()>;

    fn is_connected(&self) -> bool {
        true
    }
}
