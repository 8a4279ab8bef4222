//! Order validation
//!
//! Gatekeeper between "received from somewhere" and "eligible for storage".
//! Rejections are expected traffic on an open gossip network: they are logged
//! at info and dropped, never surfaced as errors.

use crate::domain::hashing::OrderHasher;
use crate::domain::order::{Order, OrderKind};
use crate::domain::signature::{OrderSignature, SignatureError, SigningConvention};
use crate::infrastructure::config::OrderbookConfig;
use ethers::types::{Address, H256};
use thiserror::Error;
use tracing::info;

/// Why an order was not accepted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("hash mismatch: carried {carried:?}, computed {computed:?}")]
    HashMismatch { carried: H256, computed: H256 },

    #[error("unsupported order kind {0:?}")]
    UnsupportedKind(OrderKind),

    #[error("unsupported ask currency {0:?}")]
    UnsupportedCurrency(Address),

    #[error("malformed signature: {0}")]
    MalformedSignature(#[from] SignatureError),

    #[error("signature recovers to {recovered:?}, seller is {seller:?}")]
    SignerMismatch { recovered: Address, seller: Address },
}

/// Stateless order validator
#[derive(Debug, Clone)]
pub struct OrderValidator {
    hasher: OrderHasher,
    ask_currency: Address,
    supported_kind: OrderKind,
    convention: SigningConvention,
}

impl OrderValidator {
    pub fn new(
        hasher: OrderHasher,
        ask_currency: Address,
        supported_kind: OrderKind,
        convention: SigningConvention,
    ) -> Self {
        Self {
            hasher,
            ask_currency,
            supported_kind,
            convention,
        }
    }

    pub fn from_config(config: &OrderbookConfig) -> Self {
        Self::new(
            config.hasher(),
            config.market.ask_currency,
            config.market.supported_kind(),
            config.market.signing_convention,
        )
    }

    pub fn hasher(&self) -> &OrderHasher {
        &self.hasher
    }

    /// Hash and trade-shape checks, without signature recovery
    pub fn check_terms(&self, order: &Order) -> Result<(), Rejection> {
        let computed = self.hasher.hash_order(order);
        if computed != order.hash {
            return Err(Rejection::HashMismatch {
                carried: order.hash,
                computed,
            });
        }

        if order.kind != self.supported_kind {
            return Err(Rejection::UnsupportedKind(order.kind));
        }

        if order.ask.token != self.ask_currency {
            return Err(Rejection::UnsupportedCurrency(order.ask.token));
        }

        Ok(())
    }

    /// Full validation. Accepted orders come back with a canonical signature,
    /// so validating a survivor again returns it unchanged.
    pub fn check(&self, order: &Order) -> Result<Order, Rejection> {
        self.check_terms(order)?;

        let signature = OrderSignature::parse(&order.signature)?;

        match self.recover_matches(&signature, order) {
            Ok(()) => Ok(order.clone()),
            // Legacy clients wrote v as 0/1; lift to 27/28 and retry once
            Err(_) if !signature.is_canonical() && signature.normalized().is_canonical() => {
                let normalized = signature.normalized();
                self.recover_matches(&normalized, order)?;

                let mut fixed = order.clone();
                fixed.signature = normalized.to_bytes();
                Ok(fixed)
            }
            Err(rejection) => Err(rejection),
        }
    }

    fn recover_matches(&self, signature: &OrderSignature, order: &Order) -> Result<(), Rejection> {
        let recovered = signature.recover(order.hash, self.convention)?;
        if recovered != order.seller {
            return Err(Rejection::SignerMismatch {
                recovered,
                seller: order.seller,
            });
        }
        Ok(())
    }

    /// Validate one candidate, logging the reason when it is dropped
    pub fn validate(&self, order: &Order) -> Option<Order> {
        match self.check(order) {
            Ok(order) => Some(order),
            Err(rejection) => {
                info!(hash = ?order.hash, reason = %rejection, "Dropping order");
                None
            }
        }
    }

    /// Validate a batch, keeping survivors in input order
    pub fn validate_batch(&self, orders: &[Order]) -> Vec<Order> {
        orders.iter().filter_map(|order| self.validate(order)).collect()
    }
}
