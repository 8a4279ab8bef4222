//! Row representation of stored orders

use crate::domain::encoding::sort_key;
use crate::domain::order::{Order, OrderError, OrderStatus, StoredOrder};
use chrono::Utc;
use ethers::types::{Address, H256};

/// Database representation of an order
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DbOrder {
    pub hash: String,
    pub status: i64,
    pub seller: String,
    pub sell_token: String,
    /// Sort-key form of the sold token id
    pub sell_token_id: String,
    pub ask_token: String,
    pub price_key: String,
    pub expiration_key: String,
    /// Full order as wire JSON
    pub body: String,
    pub received_at: String, // ISO 8601
    /// Unix millis of the last gossip announcement
    pub last_broadcast_at: Option<i64>,
}

impl DbOrder {
    pub fn from_order(order: &Order, status: OrderStatus) -> Result<Self, OrderError> {
        Ok(Self {
            hash: hash_key(order.hash),
            status: status.as_i64(),
            seller: address_key(order.seller),
            sell_token: address_key(order.sell.token),
            sell_token_id: sort_key(order.sell.amount_or_id),
            ask_token: address_key(order.ask.token),
            price_key: sort_key(order.ask.amount_or_id),
            expiration_key: sort_key(order.expiration),
            body: serde_json::to_string(order)?,
            received_at: Utc::now().to_rfc3339(),
            last_broadcast_at: None,
        })
    }

    pub fn order(&self) -> Result<Order, OrderError> {
        let order: Order = serde_json::from_str(&self.body)?;
        if hash_key(order.hash) != self.hash {
            return Err(OrderError::InvalidField {
                field: "body",
                reason: format!("body hash does not match row {}", self.hash),
            });
        }
        Ok(order)
    }

    pub fn into_stored(self) -> Result<StoredOrder, OrderError> {
        let order = self.order()?;
        Ok(StoredOrder {
            order,
            status: OrderStatus::from_i64(self.status)?,
            price_key: self.price_key,
            expiration_key: self.expiration_key,
        })
    }
}

/// Canonical text key of an order hash (lowercase, 0x-prefixed)
pub fn hash_key(hash: H256) -> String {
    format!("{:?}", hash)
}

/// Canonical text key of an address (lowercase, 0x-prefixed)
pub fn address_key(address: Address) -> String {
    format!("{:?}", address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_lowercase_hex() {
        let address: Address = "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1".parse().unwrap();
        assert_eq!(
            address_key(address),
            "0x82af49447d8a07e3bd95bd0d56f35241523fbab1"
        );
        assert_eq!(hash_key(H256::zero()).len(), 66);
    }
}
