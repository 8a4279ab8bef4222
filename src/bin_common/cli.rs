//! CLI utilities for binaries
//!
//! Handles configuration loading and environment variables
//! for all binary executables.

use std::path::PathBuf;

/// Type of configuration to load
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Orderbook node configuration (orderbook_config.yaml)
    Orderbook,
    /// Custom path
    Custom(String),
}

impl ConfigType {
    /// Get the default path for this config type
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Orderbook => "config/orderbook_config.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Get the environment variable name for this config type
    pub fn env_var_name(&self) -> &str {
        match self {
            ConfigType::Orderbook => "ORDERBOOK_CONFIG_PATH",
            ConfigType::Custom(_) => "CONFIG_PATH",
        }
    }
}

/// Load configuration path from environment or use default
///
/// # Examples
/// ```
/// use smolpuddle::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Orderbook);
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    std::env::var(config_type.env_var_name())
        .unwrap_or_else(|_| config_type.default_path().to_string())
        .into()
}

/// Parse command line arguments for a binary
///
/// Returns a vector of arguments (excluding the program name)
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}
