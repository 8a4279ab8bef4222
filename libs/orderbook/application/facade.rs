//! Application Facade
//!
//! Public API for binaries (presentation layer).
//! Wires the store, validator, reconciler and sync service together
//! explicitly at startup.

use super::reconciler::StatusReconciler;
use super::sync::{OrderbookSync, SyncSettings};
use super::validator::OrderValidator;
use crate::domain::order::{
    listing_expiration, random_salt, Asset, Order, OrderStatus, OrderTerms, UnsignedOrder,
};
use crate::domain::query::{OrderPage, OrderQuery};
use crate::infrastructure::{
    init_tracing, init_tracing_with_level, EthersStatusOracle, GossipChannel, Heartbeat,
    MemoryGossip, OrderDatabase, OrderRelay, OrderSigner, OrderbookConfig, RelayClient,
    ShutdownManager, StatusOracle, WebSocketGossip,
};
use chrono::Utc;
use ethers::types::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Initialize logging with the default filter
pub fn init_logging() {
    init_tracing();
}

/// Initialize logging at the configured level
pub fn init_logging_with_level(level: &str) {
    init_tracing_with_level(level);
}

/// Application facade for the orderbook node
pub struct OrderbookApp {
    pub config: OrderbookConfig,
    pub database: Arc<OrderDatabase>,
    pub sync: Arc<OrderbookSync>,
    pub shutdown: ShutdownManager,
    pub heartbeat: Heartbeat,
}

impl OrderbookApp {
    /// Connect every production collaborator described by `config`
    pub async fn new(config: OrderbookConfig) -> anyhow::Result<Self> {
        let shutdown = ShutdownManager::new();

        let database = Arc::new(OrderDatabase::new(&config.database.url).await?);
        let relay: Arc<dyn OrderRelay> = Arc::new(RelayClient::new(&config.relay)?);
        let oracle: Arc<dyn StatusOracle> = Arc::new(EthersStatusOracle::connect(&config.chain)?);

        let gossip: Arc<dyn GossipChannel> = match &config.gossip.ws_url {
            Some(url) => Arc::new(WebSocketGossip::spawn(
                url.clone(),
                config.gossip.topic.clone(),
                Duration::from_secs(config.gossip.reconnect_delay_secs),
                shutdown.clone(),
            )),
            None => {
                warn!("No gossip relay configured, orders are only exchanged through HTTP relays");
                Arc::new(MemoryGossip::new())
            }
        };

        Ok(Self::with_components(config, database, oracle, gossip, relay, shutdown))
    }

    /// Build around already constructed collaborators
    pub fn with_components(
        config: OrderbookConfig,
        database: Arc<OrderDatabase>,
        oracle: Arc<dyn StatusOracle>,
        gossip: Arc<dyn GossipChannel>,
        relay: Arc<dyn OrderRelay>,
        shutdown: ShutdownManager,
    ) -> Self {
        let validator = OrderValidator::from_config(&config);
        let reconciler = Arc::new(StatusReconciler::new(
            oracle,
            Arc::clone(&database),
            config.sync.reconcile_concurrency,
        ));
        let sync = Arc::new(OrderbookSync::new(
            Arc::clone(&database),
            validator,
            reconciler,
            gossip,
            relay,
            SyncSettings::from_config(&config),
        ));
        let heartbeat = Heartbeat::new(config.sync.heartbeat_interval_secs);

        Self {
            config,
            database,
            sync,
            shutdown,
            heartbeat,
        }
    }

    /// Check if app is still running
    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    /// Start the gossip listener and the periodic sync loops
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        self.sync.spawn(&self.shutdown)
    }

    /// Run until Ctrl+C, logging store counts on every heartbeat
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.shutdown.spawn_signal_handler();
        let handles = self.start();

        while self.is_running() {
            if self.heartbeat.should_beat() {
                self.log_status().await;
                self.heartbeat.beat();
            }
            self.shutdown.interruptible_sleep(Duration::from_secs(1)).await;
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Sync task ended abnormally: {}", e);
            }
        }
        self.database.close().await;

        Ok(())
    }

    async fn log_status(&self) {
        match self.database.order_count().await {
            Ok(total) => {
                let open = self
                    .database
                    .count_by_status(OrderStatus::Open)
                    .await
                    .unwrap_or_default();
                info!(total, open, revision = self.sync.listings().revision(), "[HEARTBEAT] Orderbook");
            }
            Err(e) => warn!("Failed to read order counts: {}", e),
        }
    }

    /// Wait up to `limit` for the gossip connection. Returns whether it is up.
    pub async fn wait_for_gossip(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while !self.sync.gossip_connected() {
            if !self.is_running() || tokio::time::Instant::now() >= deadline {
                return false;
            }
            self.shutdown.interruptible_sleep(Duration::from_millis(100)).await;
        }
        true
    }

    /// One page of listings
    pub async fn listings(&self, query: &OrderQuery) -> anyhow::Result<OrderPage> {
        Ok(self.sync.open_listings(query).await?)
    }

    /// Build, sign and store a sell listing, announcing it when `broadcast` is set
    pub async fn create_listing(
        &self,
        signer: &OrderSigner,
        collection: Address,
        token_id: U256,
        price: U256,
        broadcast: bool,
    ) -> anyhow::Result<Order> {
        let now_millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        let terms = OrderTerms {
            seller: signer.address(),
            kind: self.config.market.supported_kind(),
            sell: Asset::new(collection, token_id),
            ask: Asset::new(self.config.market.ask_currency, price),
            fees: Vec::new(),
            expiration: listing_expiration(now_millis),
            salt: random_salt(),
        };

        let unsigned = UnsignedOrder::new(terms, &self.config.hasher());
        let order = signer.sign(unsigned).await?;
        self.sync.add_order(order.clone(), broadcast).await?;

        Ok(order)
    }
}
