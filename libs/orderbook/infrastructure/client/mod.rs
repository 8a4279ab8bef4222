//! Clients for the external collaborators: HTTP relays and the chain

pub mod chain;
pub mod relay;

pub use chain::{EthersStatusOracle, OracleError, StatusOracle};
pub use relay::{OrderRelay, RelayClient, RelayError};
