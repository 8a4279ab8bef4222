//! On-chain order status and NFT ownership reads
//!
//! Both reads are view calls; nothing here signs or sends transactions.

use crate::infrastructure::config::ChainConfig;
use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

// Marketplace status view: 0 open, 1 executed, 2 canceled
abigen!(
    SmolPuddle,
    r#"[
        function status(address seller, bytes32 hash) external view returns (uint256)
    ]"#
);

abigen!(
    ERC721,
    r#"[
        function ownerOf(uint256 tokenId) external view returns (address)
    ]"#
);

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Contract error: {0}")]
    ContractError(String),

    #[error("Call timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, OracleError>;

/// Read-only view of chain state used to reconcile cached order status
#[async_trait]
pub trait StatusOracle: Send + Sync {
    /// Raw `status(seller, hash)` value of the marketplace contract
    async fn order_status(&self, seller: Address, hash: H256) -> Result<U256>;

    /// Current owner of `token_id` in the `collection` ERC-721 contract
    async fn owner_of(&self, collection: Address, token_id: U256) -> Result<Address>;
}

/// StatusOracle over an HTTP JSON-RPC provider
pub struct EthersStatusOracle<M: Middleware> {
    marketplace: SmolPuddle<M>,
    provider: Arc<M>,
    timeout: Duration,
}

impl EthersStatusOracle<Provider<Http>> {
    /// Connect to the configured RPC endpoint
    pub fn connect(config: &ChainConfig) -> Result<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| OracleError::ProviderError(e.to_string()))?;

        Ok(Self::new(
            Arc::new(provider),
            config.marketplace_contract,
            Duration::from_secs(config.rpc_timeout_secs),
        ))
    }
}

impl<M: Middleware + 'static> EthersStatusOracle<M> {
    pub fn new(provider: Arc<M>, marketplace: Address, timeout: Duration) -> Self {
        Self {
            marketplace: SmolPuddle::new(marketplace, provider.clone()),
            provider,
            timeout,
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> StatusOracle for EthersStatusOracle<M> {
    async fn order_status(&self, seller: Address, hash: H256) -> Result<U256> {
        let call = self.marketplace.status(seller, hash.to_fixed_bytes());

        let status = tokio::time::timeout(self.timeout, call.call())
            .await
            .map_err(|_| OracleError::Timeout(self.timeout))?
            .map_err(|e| OracleError::ContractError(e.to_string()))?;

        debug!(seller = ?seller, hash = ?hash, status = %status, "Order status");
        Ok(status)
    }

    async fn owner_of(&self, collection: Address, token_id: U256) -> Result<Address> {
        let nft = ERC721::new(collection, self.provider.clone());
        let call = nft.owner_of(token_id);

        let owner = tokio::time::timeout(self.timeout, call.call())
            .await
            .map_err(|_| OracleError::Timeout(self.timeout))?
            .map_err(|e| OracleError::ContractError(e.to_string()))?;

        debug!(collection = ?collection, token_id = %token_id, owner = ?owner, "Token owner");
        Ok(owner)
    }
}
