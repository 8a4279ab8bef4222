//! Order entities
//!
//! An [`Order`] is a signed intent to trade one NFT for an amount of a fungible
//! token. Its `hash` is content-addressed over every field except the signature,
//! so any change to the terms produces a different order.

use super::hashing::OrderHasher;
use super::wire::u256_lenient;
use ethers::types::{Address, Bytes, H256, U256};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("Unknown order status: {0}")]
    UnknownStatus(i64),

    #[error("Invalid stored field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OrderError>;

/// Token contract plus an amount (fungible side) or a token id (NFT side)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub token: Address,
    #[serde(with = "u256_lenient")]
    pub amount_or_id: U256,
}

impl Asset {
    pub fn new(token: Address, amount_or_id: impl Into<U256>) -> Self {
        Self {
            token,
            amount_or_id: amount_or_id.into(),
        }
    }
}

/// Side payment attached to an order
///
/// The network spells the amount key `amontOrId`; `amountOrId` is accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub recipient: Address,
    #[serde(rename = "amontOrId", alias = "amountOrId", with = "u256_lenient")]
    pub amount_or_id: U256,
}

/// Trade shape tag (the `orderType` field of the contract tuple)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub enum OrderKind {
    /// Sell an NFT, currency on the ask side
    SellNft,
    /// Buy an NFT, currency on the sell side
    BuyNft,
    Nonce,
    Unknown(u64),
}

impl OrderKind {
    pub fn as_u64(self) -> u64 {
        match self {
            OrderKind::SellNft => 0,
            OrderKind::BuyNft => 1,
            OrderKind::Nonce => 2,
            OrderKind::Unknown(value) => value,
        }
    }
}

impl From<u64> for OrderKind {
    fn from(value: u64) -> Self {
        match value {
            0 => OrderKind::SellNft,
            1 => OrderKind::BuyNft,
            2 => OrderKind::Nonce,
            other => OrderKind::Unknown(other),
        }
    }
}

impl From<OrderKind> for u64 {
    fn from(kind: OrderKind) -> Self {
        kind.as_u64()
    }
}

/// Every hashed field of an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerms {
    pub seller: Address,
    pub kind: OrderKind,
    pub sell: Asset,
    pub ask: Asset,
    pub fees: Vec<Fee>,
    pub expiration: U256,
    pub salt: H256,
}

/// Order with its hash computed but no signature yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedOrder {
    pub hash: H256,
    pub terms: OrderTerms,
}

impl UnsignedOrder {
    /// Seal the terms by computing their hash
    pub fn new(terms: OrderTerms, hasher: &OrderHasher) -> Self {
        let hash = hasher.compute_hash(&terms);
        Self { hash, terms }
    }
}

/// Attach a signature to an unsigned order. No validation happens here.
pub fn attach_signature(unsigned: UnsignedOrder, signature: impl Into<Bytes>) -> Order {
    let UnsignedOrder { hash, terms } = unsigned;
    Order {
        hash,
        kind: terms.kind,
        sell: terms.sell,
        ask: terms.ask,
        seller: terms.seller,
        expiration: terms.expiration,
        salt: terms.salt,
        fees: terms.fees,
        signature: signature.into(),
    }
}

/// Signed order as exchanged on the gossip network and the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub hash: H256,
    #[serde(rename = "currency")]
    pub kind: OrderKind,
    pub sell: Asset,
    pub ask: Asset,
    pub seller: Address,
    #[serde(with = "u256_lenient")]
    pub expiration: U256,
    pub salt: H256,
    #[serde(default)]
    pub fees: Vec<Fee>,
    pub signature: Bytes,
}

impl Order {
    pub fn terms(&self) -> OrderTerms {
        OrderTerms {
            seller: self.seller,
            kind: self.kind,
            sell: self.sell.clone(),
            ask: self.ask.clone(),
            fees: self.fees.clone(),
            expiration: self.expiration,
            salt: self.salt,
        }
    }

    /// NFT collection being sold
    pub fn collection(&self) -> Address {
        self.sell.token
    }

    /// Token id being sold
    pub fn token_id(&self) -> U256 {
        self.sell.amount_or_id
    }
}

/// Locally tracked lifecycle state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    /// Executed on chain
    Closed,
    Canceled,
    /// Seller no longer owns the listed token
    BadOwner,
}

impl OrderStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            OrderStatus::Open => 0,
            OrderStatus::Closed => 1,
            OrderStatus::Canceled => 2,
            OrderStatus::BadOwner => 3,
        }
    }

    pub fn from_i64(value: i64) -> Result<Self> {
        match value {
            0 => Ok(OrderStatus::Open),
            1 => Ok(OrderStatus::Closed),
            2 => Ok(OrderStatus::Canceled),
            3 => Ok(OrderStatus::BadOwner),
            other => Err(OrderError::UnknownStatus(other)),
        }
    }

    /// Executed and canceled orders never come back
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Closed | OrderStatus::Canceled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "open"),
            OrderStatus::Closed => write!(f, "closed"),
            OrderStatus::Canceled => write!(f, "canceled"),
            OrderStatus::BadOwner => write!(f, "bad_owner"),
        }
    }
}

/// Order plus local bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOrder {
    pub order: Order,
    pub status: OrderStatus,
    /// Order-preserving projection of `ask.amount_or_id`
    pub price_key: String,
    /// Order-preserving projection of `expiration`
    pub expiration_key: String,
}

/// Status reported by the marketplace contract's `status(seller, hash)` view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOrderStatus {
    Open,
    Executed,
    Canceled,
}

impl ChainOrderStatus {
    /// Decode the contract's numeric status; anything else is unknown
    pub fn from_u256(value: U256) -> Option<Self> {
        if value > U256::from(2u8) {
            return None;
        }
        match value.as_u64() {
            0 => Some(ChainOrderStatus::Open),
            1 => Some(ChainOrderStatus::Executed),
            2 => Some(ChainOrderStatus::Canceled),
            _ => None,
        }
    }
}

/// Base of the listing expiration convention (2^64 - 1)
pub const LISTING_EXPIRATION_BASE: u64 = u64::MAX;

/// Expiration used for new listings: a sentinel base plus the creation time.
/// Sorting by expiration therefore sorts by listing recency.
pub fn listing_expiration(now_millis: u64) -> U256 {
    U256::from(LISTING_EXPIRATION_BASE) + U256::from(now_millis)
}

/// Random salt: 8 random bytes left-padded to 32
pub fn random_salt() -> H256 {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes[24..]);
    H256(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_kind_roundtrip_values() {
        assert_eq!(OrderKind::from(0), OrderKind::SellNft);
        assert_eq!(OrderKind::from(2), OrderKind::Nonce);
        assert_eq!(OrderKind::from(7), OrderKind::Unknown(7));
        assert_eq!(OrderKind::Unknown(7).as_u64(), 7);
    }

    #[test]
    fn test_status_codes() {
        for status in [
            OrderStatus::Open,
            OrderStatus::Closed,
            OrderStatus::Canceled,
            OrderStatus::BadOwner,
        ] {
            assert_eq!(OrderStatus::from_i64(status.as_i64()).unwrap(), status);
        }
        assert!(OrderStatus::from_i64(9).is_err());
        assert!(OrderStatus::Closed.is_terminal());
        assert!(!OrderStatus::BadOwner.is_terminal());
    }

    #[test]
    fn test_chain_status_decoding() {
        assert_eq!(ChainOrderStatus::from_u256(U256::zero()), Some(ChainOrderStatus::Open));
        assert_eq!(ChainOrderStatus::from_u256(U256::one()), Some(ChainOrderStatus::Executed));
        assert_eq!(ChainOrderStatus::from_u256(U256::from(2)), Some(ChainOrderStatus::Canceled));
        assert_eq!(ChainOrderStatus::from_u256(U256::from(3)), None);
        assert_eq!(ChainOrderStatus::from_u256(U256::MAX), None);
    }

    #[test]
    fn test_random_salt_layout() {
        let salt = random_salt();
        assert_eq!(&salt.as_bytes()[..24], &[0u8; 24]);
        assert_ne!(random_salt(), random_salt());
    }

    #[test]
    fn test_listing_expiration_orders_by_time() {
        let earlier = listing_expiration(1_650_000_000_000);
        let later = listing_expiration(1_650_000_000_001);
        assert!(later > earlier);
        assert!(earlier > U256::from(u64::MAX));
    }
}
