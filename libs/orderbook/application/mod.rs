//! Application Layer
//!
//! Contains use cases and application services.
//! This layer depends on domain and infrastructure layers.

pub mod facade;
pub mod listings;
pub mod reconciler;
pub mod sync;
pub mod validator;

// Re-export application facade for binaries
pub use facade::{init_logging, init_logging_with_level, OrderbookApp};

pub use listings::ListingsFeed;
pub use reconciler::{Classification, StatusReconciler, Verdict};
pub use sync::{IngestStats, OrderSource, OrderbookSync, SyncError, SyncSettings};
pub use validator::{OrderValidator, Rejection};
