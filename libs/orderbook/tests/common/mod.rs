//! Common test utilities for orderbook integration tests
//!
//! Deterministic wallets, order builders, an in-memory store and scripted
//! stand-ins for the chain and the HTTP relays.

#![allow(dead_code)]

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use orderbook::application::{OrderValidator, OrderbookSync, StatusReconciler, SyncSettings};
use orderbook::domain::{Asset, Fee, Order, OrderHasher, OrderKind, OrderTerms, SigningConvention, UnsignedOrder};
use orderbook::infrastructure::client::relay::Result as RelayResult;
use orderbook::infrastructure::client::chain::Result as OracleResult;
use orderbook::infrastructure::gossip::Result as GossipResult;
use orderbook::infrastructure::{
    GossipChannel, GossipError, MemoryGossip, OracleError, OrderDatabase, OrderRelay, OrderSigner,
    RelayError, StatusOracle,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

pub const SELLER_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const OTHER_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

pub fn collection() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn other_collection() -> Address {
    Address::repeat_byte(0xbb)
}

pub fn currency() -> Address {
    Address::repeat_byte(0xcc)
}

/// One whole unit of an 18-decimal currency
pub fn unit() -> U256 {
    U256::exp10(18)
}

pub fn seller() -> OrderSigner {
    OrderSigner::new(SELLER_KEY, 42161, SigningConvention::EthSign).unwrap()
}

pub fn other_seller() -> OrderSigner {
    OrderSigner::new(OTHER_KEY, 42161, SigningConvention::EthSign).unwrap()
}

pub fn validator() -> OrderValidator {
    OrderValidator::new(
        OrderHasher::abi(),
        currency(),
        OrderKind::SellNft,
        SigningConvention::EthSign,
    )
}

pub mod fixtures {
    //! Order builders

    use super::*;

    /// Listing terms; `salt` keeps otherwise identical listings apart
    pub fn listing_terms(
        seller: Address,
        collection: Address,
        token_id: u64,
        price: U256,
        salt: u64,
    ) -> OrderTerms {
        OrderTerms {
            seller,
            kind: OrderKind::SellNft,
            sell: Asset::new(collection, token_id),
            ask: Asset::new(currency(), price),
            fees: vec![
                Fee {
                    recipient: Address::repeat_byte(0xd1),
                    amount_or_id: U256::from(250),
                },
                Fee {
                    recipient: Address::repeat_byte(0xd2),
                    amount_or_id: U256::from(100),
                },
            ],
            expiration: U256::from(u64::MAX) + U256::from(1_650_000_000_000u64 + salt),
            salt: H256::from_low_u64_be(salt),
        }
    }

    /// Signed listing for `collection` token `token_id` at `price`
    pub async fn listing(
        signer: &OrderSigner,
        collection: Address,
        token_id: u64,
        price: U256,
        salt: u64,
    ) -> Order {
        let terms = listing_terms(signer.address(), collection, token_id, price, salt);
        signer
            .sign(UnsignedOrder::new(terms, &OrderHasher::abi()))
            .await
            .unwrap()
    }

    /// The seller's listing of token #5 of 0xAA for 1.0 unit
    pub async fn order_a() -> Order {
        listing(&seller(), collection(), 5, unit(), 1).await
    }
}

pub async fn memory_db() -> Arc<OrderDatabase> {
    Arc::new(OrderDatabase::new("sqlite::memory:").await.unwrap())
}

// ==================== CHAIN ====================

/// Scripted chain state. Orders are open unless told otherwise and tokens
/// without a recorded owner fail the ownership read.
#[derive(Default)]
pub struct FakeOracle {
    statuses: Mutex<HashMap<H256, Option<U256>>>,
    owners: Mutex<HashMap<(Address, U256), Address>>,
    failing_owners: Mutex<Vec<(Address, U256)>>,
}

impl FakeOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_status(&self, hash: H256, status: u64) {
        self.statuses.lock().insert(hash, Some(U256::from(status)));
    }

    /// Make the status read for `hash` revert
    pub fn fail_status(&self, hash: H256) {
        self.statuses.lock().insert(hash, None);
    }

    pub fn set_owner(&self, collection: Address, token_id: U256, owner: Address) {
        self.owners.lock().insert((collection, token_id), owner);
    }

    /// Record the seller as the owner of the listed token
    pub fn owned(&self, order: &Order) {
        self.set_owner(order.collection(), order.token_id(), order.seller);
    }

    pub fn fail_owner(&self, collection: Address, token_id: U256) {
        self.failing_owners.lock().push((collection, token_id));
    }
}

#[async_trait]
impl StatusOracle for FakeOracle {
    async fn order_status(&self, _seller: Address, hash: H256) -> OracleResult<U256> {
        match self.statuses.lock().get(&hash) {
            Some(Some(status)) => Ok(*status),
            Some(None) => Err(OracleError::ContractError("execution reverted".to_string())),
            None => Ok(U256::zero()),
        }
    }

    async fn owner_of(&self, collection: Address, token_id: U256) -> OracleResult<Address> {
        if self.failing_owners.lock().contains(&(collection, token_id)) {
            return Err(OracleError::ProviderError("connection reset".to_string()));
        }
        self.owners
            .lock()
            .get(&(collection, token_id))
            .copied()
            .ok_or_else(|| OracleError::ContractError("nonexistent token".to_string()))
    }
}

// ==================== RELAY ====================

/// Relay serving a fixed snapshot and recording what is posted
#[derive(Default)]
pub struct FakeRelay {
    snapshot: Mutex<Vec<Order>>,
    posted: Mutex<Vec<Order>>,
    unreachable: Mutex<bool>,
    accept_limit: Mutex<Option<usize>>,
}

impl FakeRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, orders: Vec<Order>) {
        *self.snapshot.lock() = orders;
    }

    pub fn go_offline(&self) {
        *self.unreachable.lock() = true;
    }

    /// Take at most the first `limit` orders of every post, as if later
    /// chunks failed everywhere
    pub fn accept_only(&self, limit: usize) {
        *self.accept_limit.lock() = Some(limit);
    }

    pub fn posted(&self) -> Vec<Order> {
        self.posted.lock().clone()
    }
}

#[async_trait]
impl OrderRelay for FakeRelay {
    async fn fetch_orders(&self) -> RelayResult<Vec<Order>> {
        if *self.unreachable.lock() {
            return Err(RelayError::NoEndpointReachable);
        }
        Ok(self.snapshot.lock().clone())
    }

    async fn post_orders(&self, orders: &[Order]) -> RelayResult<Vec<H256>> {
        if *self.unreachable.lock() {
            return Err(RelayError::NoEndpointReachable);
        }
        let limit = self.accept_limit.lock().unwrap_or(orders.len());
        let accepted = &orders[..limit.min(orders.len())];
        if accepted.is_empty() {
            return Err(RelayError::NoEndpointReachable);
        }
        self.posted.lock().extend_from_slice(accepted);
        Ok(accepted.iter().map(|order| order.hash).collect())
    }
}

// ==================== GOSSIP ====================

/// Gossip transport whose relay is never reachable
pub struct OfflineGossip {
    incoming: broadcast::Sender<Value>,
}

impl OfflineGossip {
    pub fn new() -> Arc<Self> {
        let (incoming, _) = broadcast::channel(16);
        Arc::new(Self { incoming })
    }
}

#[async_trait]
impl GossipChannel for OfflineGossip {
    fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.incoming.subscribe()
    }

    async fn publish(&self, _payload: Value) -> GossipResult<()> {
        Err(GossipError::NotConnected)
    }

    fn is_connected(&self) -> bool {
        false
    }
}

// ==================== SYNC ====================

pub struct Harness {
    pub database: Arc<OrderDatabase>,
    pub oracle: Arc<FakeOracle>,
    pub relay: Arc<FakeRelay>,
    pub gossip: MemoryGossip,
    pub sync: Arc<OrderbookSync>,
}

impl Harness {
    pub async fn new(settings: SyncSettings) -> Self {
        let gossip = MemoryGossip::new();
        Self::with_transport(settings, gossip.clone(), Arc::new(gossip)).await
    }

    /// Sync publishing through `transport`; `gossip` is still wired up for
    /// assertions but only sees what tests push into it
    pub async fn with_transport(
        settings: SyncSettings,
        gossip: MemoryGossip,
        transport: Arc<dyn GossipChannel>,
    ) -> Self {
        let database = memory_db().await;
        let oracle = FakeOracle::new();
        let relay = FakeRelay::new();

        let reconciler = Arc::new(StatusReconciler::new(oracle.clone(), Arc::clone(&database), 4));
        let sync = Arc::new(OrderbookSync::new(
            Arc::clone(&database),
            validator(),
            reconciler,
            transport,
            relay.clone(),
            settings,
        ));

        Self {
            database,
            oracle,
            relay,
            gossip,
            sync,
        }
    }

    pub async fn with_defaults() -> Self {
        Self::new(SyncSettings::default()).await
    }
}
