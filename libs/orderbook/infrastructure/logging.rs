//! Logging initialization

use tracing_subscriber::EnvFilter;

/// Initialize tracing with standard configuration
///
/// `RUST_LOG` wins when set, otherwise everything logs at info.
pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Initialize tracing with a default level such as `"debug"` or `"orderbook=trace,info"`
pub fn init_tracing_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second initialization (tests, embedded use) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .try_init();
}
