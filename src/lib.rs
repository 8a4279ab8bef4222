//! SmolPuddle orderbook node - Main Library
//!
//! This crate provides the binaries' shared library for the orderbook node,
//! following Clean Architecture principles.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI)
//! - **orderbook**: Core order sync, validation and storage (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use smolpuddle::bin_common::{load_config_from_env, ConfigType};
//! use smolpuddle::orderbook::application::OrderbookApp;
//! ```

// Re-export workspace libraries for convenience
pub use orderbook;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables
    //!
    //! Provides shared functionality for the presentation layer (binaries)
    //! following Clean Architecture principles.

    pub mod cli;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
}
