//! Orderbook synchronization service
//!
//! Every source funnels into [`OrderbookSync::ingest`]: validate, skip hashes
//! already stored, insert the rest as open, then (optionally) check the new
//! orders against the chain. Periodic loops pull relay snapshots, re-announce
//! open orders and reconcile stored status.

use super::{Result, SyncError};
use crate::application::listings::ListingsFeed;
use crate::application::reconciler::{Classification, StatusReconciler};
use crate::application::validator::OrderValidator;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::query::{OrderPage, OrderQuery};
use crate::domain::wire::{decode_orders, encode_orders, is_order_array};
use crate::infrastructure::client::OrderRelay;
use crate::infrastructure::config::OrderbookConfig;
use crate::infrastructure::database::OrderDatabase;
use crate::infrastructure::gossip::GossipChannel;
use crate::infrastructure::shutdown::ShutdownManager;
use chrono::Utc;
use ethers::types::{Address, H256, U256};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Where a batch of orders came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSource {
    Gossip,
    Relay,
    Local,
}

impl fmt::Display for OrderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSource::Gossip => write!(f, "gossip"),
            OrderSource::Relay => write!(f, "relay"),
            OrderSource::Local => write!(f, "local"),
        }
    }
}

/// Counters for one or more ingested batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub received: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub inserted: usize,
    /// Newly inserted orders the chain already considers closed
    pub invalidated: usize,
}

impl IngestStats {
    fn absorb(&mut self, other: IngestStats) {
        self.received += other.received;
        self.accepted += other.accepted;
        self.duplicates += other.duplicates;
        self.inserted += other.inserted;
        self.invalidated += other.invalidated;
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Relay snapshot orders processed per batch
    pub chunk_size: usize,
    pub relay_interval: Duration,
    pub rebroadcast_interval: Duration,
    pub rebroadcast_window: Duration,
    /// Orders announced per gossip message
    pub rebroadcast_batch: u64,
    pub reconcile_interval: Duration,
    pub reconcile_batch: u64,
    pub verify_on_ingest: bool,
}

impl SyncSettings {
    pub fn from_config(config: &OrderbookConfig) -> Self {
        Self {
            chunk_size: config.relay.chunk_size.max(1),
            relay_interval: Duration::from_secs(config.relay.sync_interval_secs),
            rebroadcast_interval: Duration::from_secs(config.sync.rebroadcast_interval_secs),
            rebroadcast_window: config.sync.rebroadcast_window(),
            rebroadcast_batch: config.relay.max_post.max(1) as u64,
            reconcile_interval: Duration::from_secs(config.sync.reconcile_interval_secs),
            reconcile_batch: config.sync.reconcile_batch.max(1),
            verify_on_ingest: config.sync.verify_on_ingest,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&OrderbookConfig::default())
    }
}

pub struct OrderbookSync {
    database: Arc<OrderDatabase>,
    validator: OrderValidator,
    reconciler: Arc<StatusReconciler>,
    gossip: Arc<dyn GossipChannel>,
    relay: Arc<dyn OrderRelay>,
    listings: ListingsFeed,
    settings: SyncSettings,
}

impl OrderbookSync {
    pub fn new(
        database: Arc<OrderDatabase>,
        validator: OrderValidator,
        reconciler: Arc<StatusReconciler>,
        gossip: Arc<dyn GossipChannel>,
        relay: Arc<dyn OrderRelay>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            database,
            validator,
            reconciler,
            gossip,
            relay,
            listings: ListingsFeed::new(),
            settings,
        }
    }

    pub fn database(&self) -> &Arc<OrderDatabase> {
        &self.database
    }

    pub fn listings(&self) -> &ListingsFeed {
        &self.listings
    }

    pub fn gossip_connected(&self) -> bool {
        self.gossip.is_connected()
    }

    // ==================== INTAKE ====================

    /// Validate a batch and store the survivors that are new
    pub async fn ingest(&self, orders: &[Order], source: OrderSource) -> Result<IngestStats> {
        let valid = self.validator.validate_batch(orders);
        let fresh = self.database.filter_existing(&valid).await?;
        let inserted = self.database.insert_orders(&fresh, OrderStatus::Open).await?;

        let mut stats = IngestStats {
            received: orders.len(),
            accepted: valid.len(),
            duplicates: valid.len() - fresh.len(),
            inserted: inserted.len(),
            invalidated: 0,
        };

        if inserted.is_empty() {
            debug!(source = %source, received = stats.received, "Nothing new to store");
            return Ok(stats);
        }
        self.listings.bump();

        if self.settings.verify_on_ingest {
            let inserted: HashSet<_> = inserted.into_iter().collect();
            let new_orders: Vec<Order> = fresh
                .into_iter()
                .filter(|order| inserted.contains(&order.hash))
                .collect();

            let classification = self.reconciler.refresh_status(&new_orders).await?;
            stats.invalidated = invalidated(&classification);
            if stats.invalidated > 0 {
                self.listings.bump();
            }
        }

        info!(
            source = %source,
            received = stats.received,
            accepted = stats.accepted,
            duplicates = stats.duplicates,
            inserted = stats.inserted,
            invalidated = stats.invalidated,
            "Ingested orders"
        );

        Ok(stats)
    }

    /// Ingest a raw gossip payload; anything but an order array is ignored
    pub async fn ingest_payload(&self, payload: &Value) -> Result<IngestStats> {
        if !is_order_array(payload) {
            debug!("Ignoring non-order gossip payload");
            return Ok(IngestStats::default());
        }

        let orders = decode_orders(payload);
        self.ingest(&orders, OrderSource::Gossip).await
    }

    /// Store an order built and signed locally, optionally announcing it.
    ///
    /// The order must pass the hash and trade-shape checks; the signature was
    /// produced by our own signer and is not recovered again. Returns whether
    /// the order was new.
    pub async fn add_order(&self, order: Order, broadcast: bool) -> Result<bool> {
        self.validator.check_terms(&order).map_err(|rejection| {
            info!(hash = ?order.hash, reason = %rejection, "Refusing local order");
            SyncError::Rejected(rejection)
        })?;

        let inserted = self
            .database
            .insert_orders(std::slice::from_ref(&order), OrderStatus::Open)
            .await?;
        let is_new = !inserted.is_empty();
        if is_new {
            self.listings.bump();
        }

        info!(hash = ?order.hash, source = %OrderSource::Local, is_new, "Added order");

        if broadcast {
            self.announce(std::slice::from_ref(&order)).await?;
        }

        Ok(is_new)
    }

    // ==================== PERIODIC WORK ====================

    /// Pull every relay snapshot and ingest it chunk by chunk. A failed chunk
    /// is logged and skipped.
    pub async fn sync_from_relay(&self) -> Result<IngestStats> {
        let orders = self.relay.fetch_orders().await?;
        let mut total = IngestStats::default();

        for (index, chunk) in orders.chunks(self.settings.chunk_size).enumerate() {
            match self.ingest(chunk, OrderSource::Relay).await {
                Ok(stats) => total.absorb(stats),
                Err(e) => warn!(chunk = index, orders = chunk.len(), error = %e, "Error processing relay chunk"),
            }
        }

        info!(
            fetched = orders.len(),
            inserted = total.inserted,
            invalidated = total.invalidated,
            "Relay sync complete"
        );

        Ok(total)
    }

    /// Re-announce open orders not announced within the rebroadcast window.
    /// Returns the number of orders announced.
    pub async fn rebroadcast(&self) -> Result<usize> {
        let window_millis = i64::try_from(self.settings.rebroadcast_window.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_millis().saturating_sub(window_millis);
        let mut announced = 0;

        loop {
            let due = self
                .database
                .orders_due_for_broadcast(cutoff, self.settings.rebroadcast_batch)
                .await?;
            if due.is_empty() {
                break;
            }

            // Unmarked orders would come back as due again
            let marked = self.announce(&due).await?;
            announced += marked;

            if marked < due.len() || (due.len() as u64) < self.settings.rebroadcast_batch {
                break;
            }
        }

        if announced > 0 {
            info!(announced, "Rebroadcast open orders");
        }

        Ok(announced)
    }

    /// Reconcile every open order against the chain
    pub async fn reconcile(&self) -> Result<Classification> {
        let classification = self
            .reconciler
            .reconcile_open_orders(self.settings.reconcile_batch)
            .await?;

        if invalidated(&classification) > 0 {
            self.listings.bump();
        }

        Ok(classification)
    }

    /// Publish to gossip and the relays, then record the announcement for the
    /// orders some transport took: all of them when gossip accepted the batch,
    /// otherwise whatever the relays confirmed. Transport failures are only
    /// logged; orders left unmarked are retried by the next rebroadcast.
    /// Returns the number of orders marked.
    async fn announce(&self, orders: &[Order]) -> Result<usize> {
        let payload = encode_orders(orders)?;

        let published = match self.gossip.publish(payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!(orders = orders.len(), error = %e, "Failed to publish orders to gossip");
                false
            }
        };

        let posted = match self.relay.post_orders(orders).await {
            Ok(posted) => {
                debug!(posted = posted.len(), orders = orders.len(), "Posted orders to relays");
                posted
            }
            Err(e) => {
                warn!(orders = orders.len(), error = %e, "Failed to post orders to relays");
                Vec::new()
            }
        };

        let hashes: Vec<H256> = if published {
            orders.iter().map(|order| order.hash).collect()
        } else {
            posted
        };
        if !hashes.is_empty() {
            self.database.mark_broadcast(&hashes, now_millis()).await?;
        }

        Ok(hashes.len())
    }

    // ==================== QUERIES ====================

    pub async fn open_listings(&self, query: &OrderQuery) -> Result<OrderPage> {
        Ok(self.database.query_orders(query).await?)
    }

    pub async fn listing_for_token(&self, collection: Address, token_id: U256) -> Result<Option<Order>> {
        Ok(self.database.get_order_for_token(collection, token_id).await?)
    }

    /// Revision counter bumped whenever listings may have changed
    pub fn subscribe_listings(&self) -> watch::Receiver<u64> {
        self.listings.subscribe()
    }

    // ==================== LOOPS ====================

    /// Start the gossip listener and the periodic loops. Every loop runs once
    /// right away and stops when `shutdown` triggers.
    pub fn spawn(self: &Arc<Self>, shutdown: &ShutdownManager) -> Vec<JoinHandle<()>> {
        let mut handles = vec![self.spawn_gossip_listener(shutdown.clone())];

        let sync = Arc::clone(self);
        handles.push(spawn_periodic(
            "relay sync",
            self.settings.relay_interval,
            shutdown.clone(),
            move || {
                let sync = Arc::clone(&sync);
                async move {
                    if let Err(e) = sync.sync_from_relay().await {
                        warn!("Relay sync failed: {}", e);
                    }
                }
            },
        ));

        let sync = Arc::clone(self);
        handles.push(spawn_periodic(
            "rebroadcast",
            self.settings.rebroadcast_interval,
            shutdown.clone(),
            move || {
                let sync = Arc::clone(&sync);
                async move {
                    if let Err(e) = sync.rebroadcast().await {
                        warn!("Rebroadcast failed: {}", e);
                    }
                }
            },
        ));

        let sync = Arc::clone(self);
        handles.push(spawn_periodic(
            "reconcile",
            self.settings.reconcile_interval,
            shutdown.clone(),
            move || {
                let sync = Arc::clone(&sync);
                async move {
                    if let Err(e) = sync.reconcile().await {
                        error!("Reconciliation failed: {}", e);
                    }
                }
            },
        ));

        handles
    }

    fn spawn_gossip_listener(self: &Arc<Self>, shutdown: ShutdownManager) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        let mut inbox = self.gossip.subscribe();

        tokio::spawn(async move {
            info!("Listening for gossip orders");

            while shutdown.is_running() {
                tokio::select! {
                    message = inbox.recv() => match message {
                        Ok(payload) => {
                            if let Err(e) = sync.ingest_payload(&payload).await {
                                warn!("Failed to ingest gossip payload: {}", e);
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Gossip listener lagged, payloads dropped");
                        }
                        Err(RecvError::Closed) => {
                            info!("Gossip channel closed");
                            break;
                        }
                    },
                    _ = shutdown.interruptible_sleep(Duration::from_secs(1)) => {}
                }
            }

            debug!("Gossip listener stopped");
        })
    }
}

/// Run `tick` now and then every `interval` until shutdown. Ticks are spawned,
/// so a slow run overlaps the next one instead of delaying it.
fn spawn_periodic<F, Fut>(
    name: &'static str,
    interval: Duration,
    shutdown: ShutdownManager,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        info!("Starting {} loop (interval: {:?})", name, interval);

        while shutdown.is_running() {
            tokio::spawn(tick());
            shutdown.interruptible_sleep(interval).await;
        }

        debug!("{} loop stopped", name);
    })
}

fn invalidated(classification: &Classification) -> usize {
    classification.executed.len() + classification.canceled.len() + classification.bad_owner.len()
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_follow_config() {
        let mut config = OrderbookConfig::default();
        config.relay.chunk_size = 64;
        config.relay.max_post = 500;
        config.sync.rebroadcast_window_secs = 60;
        config.sync.verify_on_ingest = false;

        let settings = SyncSettings::from_config(&config);
        assert_eq!(settings.chunk_size, 64);
        assert_eq!(settings.rebroadcast_batch, 500);
        assert_eq!(settings.rebroadcast_window, Duration::from_secs(60));
        assert!(!settings.verify_on_ingest);
    }

    #[test]
    fn test_ingest_stats_absorb() {
        let mut total = IngestStats::default();
        total.absorb(IngestStats {
            received: 3,
            accepted: 2,
            duplicates: 1,
            inserted: 1,
            invalidated: 0,
        });
        total.absorb(IngestStats {
            received: 2,
            accepted: 2,
            duplicates: 0,
            inserted: 2,
            invalidated: 1,
        });

        assert_eq!(total.received, 5);
        assert_eq!(total.inserted, 3);
        assert_eq!(total.invalidated, 1);
    }

    #[test]
    fn test_source_display() {
        assert_eq!(OrderSource::Gossip.to_string(), "gossip");
        assert_eq!(OrderSource::Relay.to_string(), "relay");
    }
}
