use crate::domain::hashing::{Eip712Domain, HashingScheme, OrderHasher};
use crate::domain::order::OrderKind;
use crate::domain::signature::SigningConvention;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarMissing(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Orderbook node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderbookConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub hashing: HashingConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub gossip: GossipConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://orderbook.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Marketplace contract answering `status(seller, hash)`
    pub marketplace_contract: Address,
    /// Per-call timeout for status and ownership reads
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://arb1.arbitrum.io/rpc".to_string(),
            chain_id: 42161,
            marketplace_contract: address_literal("a39ead9429ab35bfa7aa85786bcdda500a78155d"),
            rpc_timeout_secs: default_rpc_timeout(),
        }
    }
}

/// The single trade shape accepted by the validator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Currency every listing must ask for
    pub ask_currency: Address,
    /// Numeric order kind (`currency` on the wire)
    #[serde(default)]
    pub supported_kind: u64,
    #[serde(default)]
    pub signing_convention: SigningConvention,
}

impl MarketConfig {
    pub fn supported_kind(&self) -> OrderKind {
        OrderKind::from(self.supported_kind)
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            // WETH on Arbitrum
            ask_currency: address_literal("82af49447d8a07e3bd95bd0d56f35241523fbab1"),
            supported_kind: 0,
            signing_convention: SigningConvention::EthSign,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashingConfig {
    #[serde(default)]
    pub scheme: HashingScheme,
    /// EIP-712 domain name, unused by the ABI scheme
    #[serde(default = "default_domain_name")]
    pub domain_name: String,
    #[serde(default = "default_domain_version")]
    pub domain_version: String,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            scheme: HashingScheme::Abi,
            domain_name: default_domain_name(),
            domain_version: default_domain_version(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEndpoint {
    /// GET returns the relay's snapshot of orders
    pub get_url: String,
    /// POST accepts an array of orders
    pub post_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_endpoints")]
    pub endpoints: Vec<RelayEndpoint>,
    #[serde(default = "default_relay_interval")]
    pub sync_interval_secs: u64,
    /// Orders processed per ingest step when handling a fetched snapshot
    #[serde(default = "default_relay_chunk")]
    pub chunk_size: usize,
    /// Orders per POST request
    #[serde(default = "default_max_post")]
    pub max_post: usize,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            endpoints: default_relay_endpoints(),
            sync_interval_secs: default_relay_interval(),
            chunk_size: default_relay_chunk(),
            max_post: default_max_post(),
            timeout_secs: default_http_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipConfig {
    /// WebSocket pub/sub bridge; gossip stays in-process when unset
    #[serde(default)]
    pub ws_url: Option<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            ws_url: None,
            topic: default_topic(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
    #[serde(default = "default_rebroadcast_interval")]
    pub rebroadcast_interval_secs: u64,
    /// An order is announced at most once per window
    #[serde(default = "default_rebroadcast_window")]
    pub rebroadcast_window_secs: u64,
    /// Open orders read per reconciliation page
    #[serde(default = "default_reconcile_batch")]
    pub reconcile_batch: u64,
    /// Orders resolved against the chain at the same time
    #[serde(default = "default_reconcile_concurrency")]
    pub reconcile_concurrency: usize,
    /// Reconcile newly stored orders right away
    #[serde(default = "default_true")]
    pub verify_on_ingest: bool,
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_secs: u64,
}

impl SyncConfig {
    pub fn rebroadcast_window(&self) -> Duration {
        Duration::from_secs(self.rebroadcast_window_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval(),
            rebroadcast_interval_secs: default_rebroadcast_interval(),
            rebroadcast_window_secs: default_rebroadcast_window(),
            reconcile_batch: default_reconcile_batch(),
            reconcile_concurrency: default_reconcile_concurrency(),
            verify_on_ingest: true,
            heartbeat_interval_secs: default_heartbeat(),
        }
    }
}

fn address_literal(hex_digits: &str) -> Address {
    let mut bytes = [0u8; 20];
    // Literals above are 40 valid hex digits
    if hex::decode_to_slice(hex_digits, &mut bytes).is_err() {
        return Address::zero();
    }
    Address::from(bytes)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rpc_timeout() -> u64 {
    15
}

fn default_domain_name() -> String {
    "SmolPuddle".to_string()
}

fn default_domain_version() -> String {
    "1".to_string()
}

fn default_relay_endpoints() -> Vec<RelayEndpoint> {
    vec![RelayEndpoint {
        get_url: "https://server.smolpuddle.io/get".to_string(),
        post_url: "https://server.smolpuddle.io/post".to_string(),
    }]
}

fn default_relay_interval() -> u64 {
    300
}

fn default_relay_chunk() -> usize {
    256
}

fn default_max_post() -> usize {
    1000
}

fn default_http_timeout() -> u64 {
    30
}

fn default_topic() -> String {
    "/smolpuddle-dev-v10/1/order".to_string()
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_reconcile_interval() -> u64 {
    300
}

fn default_rebroadcast_interval() -> u64 {
    120
}

fn default_rebroadcast_window() -> u64 {
    900
}

fn default_reconcile_batch() -> u64 {
    200
}

fn default_reconcile_concurrency() -> usize {
    16
}

fn default_true() -> bool {
    true
}

fn default_heartbeat() -> u64 {
    60
}

impl Default for OrderbookConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            chain: ChainConfig::default(),
            market: MarketConfig::default(),
            hashing: HashingConfig::default(),
            relay: RelayConfig::default(),
            gossip: GossipConfig::default(),
            sync: SyncConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl OrderbookConfig {
    /// Load configuration from YAML file, .env and environment overrides
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;

        // Load .env file
        dotenv::dotenv().ok(); // Don't fail if .env doesn't exist

        let mut config = Self::from_yaml_str(&yaml_content)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse YAML without touching the environment
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            info!("Overriding database URL from environment variable");
            self.database.url = db_url;
        }

        if let Ok(rpc_url) = std::env::var("RPC_URL") {
            info!("Overriding RPC URL from environment variable");
            self.chain.rpc_url = rpc_url;
        }

        if let Ok(ws_url) = std::env::var("GOSSIP_WS_URL") {
            info!("Overriding gossip WebSocket URL from environment variable");
            self.gossip.ws_url = Some(ws_url);
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url cannot be empty".to_string(),
            ));
        }

        if self.chain.rpc_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "chain.rpc_url cannot be empty".to_string(),
            ));
        }

        if self.market.ask_currency.is_zero() {
            return Err(ConfigError::ValidationError(
                "market.ask_currency must be a token address".to_string(),
            ));
        }

        for endpoint in &self.relay.endpoints {
            if endpoint.get_url.is_empty() || endpoint.post_url.is_empty() {
                return Err(ConfigError::ValidationError(
                    "relay endpoints need both get_url and post_url".to_string(),
                ));
            }
        }

        if self.relay.chunk_size == 0 || self.relay.max_post == 0 {
            return Err(ConfigError::ValidationError(
                "relay.chunk_size and relay.max_post must be greater than 0".to_string(),
            ));
        }

        if self.relay.sync_interval_secs == 0
            || self.sync.reconcile_interval_secs == 0
            || self.sync.rebroadcast_interval_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "sync intervals must be greater than 0".to_string(),
            ));
        }

        if self.sync.reconcile_batch == 0 || self.sync.reconcile_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "sync.reconcile_batch and sync.reconcile_concurrency must be greater than 0"
                    .to_string(),
            ));
        }

        if self.gossip.topic.is_empty() {
            return Err(ConfigError::ValidationError(
                "gossip.topic cannot be empty".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// Seller key for binaries that sign orders, read from `PRIVATE_KEY`
    pub fn private_key() -> Result<String> {
        std::env::var("PRIVATE_KEY").map_err(|_| ConfigError::EnvVarMissing("PRIVATE_KEY".to_string()))
    }

    /// Hasher matching the configured scheme and contract
    pub fn hasher(&self) -> OrderHasher {
        match self.hashing.scheme {
            HashingScheme::Abi => OrderHasher::abi(),
            HashingScheme::Eip712 => OrderHasher::eip712(&Eip712Domain {
                name: self.hashing.domain_name.clone(),
                version: self.hashing.domain_version.clone(),
                chain_id: self.chain.chain_id,
                verifying_contract: self.chain.marketplace_contract,
            }),
        }
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Database URL: {}", self.database.url);
        info!("  RPC URL: {} (chain {})", self.chain.rpc_url, self.chain.chain_id);
        info!("  Marketplace: {:?}", self.chain.marketplace_contract);
        info!("  Ask currency: {:?}", self.market.ask_currency);
        info!("  Order kind: {}", self.market.supported_kind);
        info!("  Hashing: {:?} / signing: {:?}", self.hashing.scheme, self.market.signing_convention);
        info!("  Relay endpoints: {}", self.relay.endpoints.len());
        info!("  Relay sync interval: {} seconds", self.relay.sync_interval_secs);
        info!(
            "  Gossip: {} on {}",
            self.gossip.topic,
            self.gossip.ws_url.as_deref().unwrap_or("in-process")
        );
        info!("  Reconcile interval: {} seconds", self.sync.reconcile_interval_secs);
        info!(
            "  Rebroadcast: every {} seconds, window {} seconds",
            self.sync.rebroadcast_interval_secs, self.sync.rebroadcast_window_secs
        );
        info!("  Verify on ingest: {}", self.sync.verify_on_ingest);
        info!("  Log level: {}", self.log_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = OrderbookConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.relay.chunk_size, 256);
        assert_eq!(config.relay.max_post, 1000);
        assert_eq!(
            config.market.ask_currency,
            "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1".parse::<Address>().unwrap()
        );
        assert_eq!(config.hasher().scheme(), HashingScheme::Abi);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
database:
  url: "sqlite::memory:"
hashing:
  scheme: eip712
sync:
  reconcile_interval_secs: 60
log_level: debug
"#;
        let config = OrderbookConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.sync.reconcile_interval_secs, 60);
        assert_eq!(config.sync.rebroadcast_window_secs, 900);
        assert_eq!(config.hasher().scheme(), HashingScheme::Eip712);
        assert_eq!(config.market.signing_convention, SigningConvention::EthSign);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = OrderbookConfig::default();

        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
        config.log_level = "info".to_string();

        config.relay.max_post = 0;
        assert!(config.validate().is_err());
        config.relay.max_post = 1000;

        config.market.ask_currency = Address::zero();
        assert!(config.validate().is_err());
    }
}
