//! Status reconciliation against chain state
//!
//! Stored status is a cache. The reconciler asks the marketplace contract for
//! each order's status and, for orders the chain still considers open, checks
//! that the seller still owns the listed token. Failed reads leave the order
//! untouched until the next pass.

use crate::domain::order::{ChainOrderStatus, Order, OrderStatus};
use crate::infrastructure::client::StatusOracle;
use crate::infrastructure::database::{OrderDatabase, Result};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of resolving one order against the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Open,
    Executed,
    Canceled,
    BadOwner,
    /// A read failed or returned something unexpected
    Unknown,
}

impl Verdict {
    /// Stored status to write, if any
    pub fn status(self) -> Option<OrderStatus> {
        match self {
            Verdict::Executed => Some(OrderStatus::Closed),
            Verdict::Canceled => Some(OrderStatus::Canceled),
            Verdict::BadOwner => Some(OrderStatus::BadOwner),
            Verdict::Open | Verdict::Unknown => None,
        }
    }
}

/// Orders bucketed by verdict
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub open: Vec<Order>,
    pub executed: Vec<Order>,
    pub canceled: Vec<Order>,
    pub bad_owner: Vec<Order>,
    pub unknown: Vec<Order>,
}

impl Classification {
    fn push(&mut self, verdict: Verdict, order: Order) {
        match verdict {
            Verdict::Open => self.open.push(order),
            Verdict::Executed => self.executed.push(order),
            Verdict::Canceled => self.canceled.push(order),
            Verdict::BadOwner => self.bad_owner.push(order),
            Verdict::Unknown => self.unknown.push(order),
        }
    }

    pub fn resolved(&self) -> usize {
        self.open.len() + self.executed.len() + self.canceled.len() + self.bad_owner.len()
    }
}

pub struct StatusReconciler {
    oracle: Arc<dyn StatusOracle>,
    database: Arc<OrderDatabase>,
    concurrency: usize,
}

impl StatusReconciler {
    pub fn new(oracle: Arc<dyn StatusOracle>, database: Arc<OrderDatabase>, concurrency: usize) -> Self {
        Self {
            oracle,
            database,
            concurrency: concurrency.max(1),
        }
    }

    /// Resolve one order: status first, ownership only when still open
    pub async fn resolve(&self, order: &Order) -> Verdict {
        let raw = match self.oracle.order_status(order.seller, order.hash).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(hash = ?order.hash, error = %e, "Status read failed");
                return Verdict::Unknown;
            }
        };

        match ChainOrderStatus::from_u256(raw) {
            Some(ChainOrderStatus::Executed) => Verdict::Executed,
            Some(ChainOrderStatus::Canceled) => Verdict::Canceled,
            None => {
                debug!(hash = ?order.hash, status = %raw, "Unexpected order status");
                Verdict::Unknown
            }
            Some(ChainOrderStatus::Open) => {
                match self.oracle.owner_of(order.collection(), order.token_id()).await {
                    Ok(owner) if owner == order.seller => Verdict::Open,
                    Ok(owner) => {
                        debug!(hash = ?order.hash, owner = ?owner, "Seller no longer owns token");
                        Verdict::BadOwner
                    }
                    Err(e) => {
                        debug!(hash = ?order.hash, error = %e, "Ownership read failed");
                        Verdict::Unknown
                    }
                }
            }
        }
    }

    /// Resolve a batch concurrently, without writing anything
    pub async fn classify(&self, orders: &[Order]) -> Classification {
        // Owned items keep the stream Send for spawned callers
        let verdicts: Vec<Verdict> = stream::iter(orders.to_vec())
            .map(|order| async move { self.resolve(&order).await })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut classification = Classification::default();
        for (order, verdict) in orders.iter().zip(verdicts) {
            classification.push(verdict, order.clone());
        }
        classification
    }

    /// Write non-open verdicts to the store. Open and unknown orders are left
    /// as they are; terminal statuses are never reverted by the store.
    pub async fn apply(&self, classification: &Classification) -> Result<u64> {
        let mut updated = 0;

        for (verdict, orders) in [
            (Verdict::Executed, &classification.executed),
            (Verdict::Canceled, &classification.canceled),
            (Verdict::BadOwner, &classification.bad_owner),
        ] {
            let Some(status) = verdict.status() else {
                continue;
            };
            let hashes: Vec<_> = orders.iter().map(|order| order.hash).collect();
            updated += self.database.set_status(&hashes, status).await?;
        }

        Ok(updated)
    }

    /// Classify a batch and record the result
    pub async fn refresh_status(&self, orders: &[Order]) -> Result<Classification> {
        if orders.is_empty() {
            return Ok(Classification::default());
        }

        let classification = self.classify(orders).await;
        let updated = self.apply(&classification).await?;

        info!(
            orders = orders.len(),
            open = classification.open.len(),
            executed = classification.executed.len(),
            canceled = classification.canceled.len(),
            bad_owner = classification.bad_owner.len(),
            unknown = classification.unknown.len(),
            updated,
            "Reconciled order status"
        );

        Ok(classification)
    }

    /// Walk every open order in pages and reconcile each page
    pub async fn reconcile_open_orders(&self, batch: u64) -> Result<Classification> {
        let mut total = Classification::default();
        let mut after = None;

        loop {
            let page = self.database.open_orders_page(after, batch).await?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.hash);
            let page_len = page.len() as u64;

            let classification = self.refresh_status(&page).await?;
            total.open.extend(classification.open);
            total.executed.extend(classification.executed);
            total.canceled.extend(classification.canceled);
            total.bad_owner.extend(classification.bad_owner);
            total.unknown.extend(classification.unknown);

            if page_len < batch {
                break;
            }
        }

        Ok(total)
    }
}
