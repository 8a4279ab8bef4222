//! In-process gossip bus
//!
//! Clones share one bus, so several local peers (or tests) can talk to each
//! other. Publishers also receive their own payloads.

use super::{GossipChannel, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

const BUS_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct MemoryGossip {
    bus: broadcast::Sender<Value>,
}

impl MemoryGossip {
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self { bus }
    }
}

impl Default for MemoryGossip {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GossipChannel for MemoryGossip {
    fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.bus.subscribe()
    }

    async fn publish(&self, payload: Value) -> Result<()> {
        // No subscribers is not an error for best-effort delivery
        let receivers = self.bus.send(payload).unwrap_or(0);
        trace!(receivers, "Published gossip payload");
        Ok(())
    }
}
