use anyhow::Result;
use orderbook::application::{init_logging_with_level, OrderbookApp};
use orderbook::infrastructure::OrderbookConfig;
use smolpuddle::bin_common::{load_config_from_env, ConfigType};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Load config first (before logging is initialized)
    let config_path = load_config_from_env(ConfigType::Orderbook);
    let config = OrderbookConfig::load(&config_path)?;

    init_logging_with_level(&config.log_level);
    config.log();

    print_banner("Orderbook Sync", &config);

    let mut app = OrderbookApp::new(config).await?;
    app.run().await?;

    print_shutdown("Orderbook sync");
    Ok(())
}

fn print_banner(name: &str, config: &OrderbookConfig) {
    info!("");
    info!("========================================");
    info!("Starting {}", name);
    info!("Relay sync interval: {}s", config.relay.sync_interval_secs);
    info!("Rebroadcast interval: {}s", config.sync.rebroadcast_interval_secs);
    info!("Reconcile interval: {}s", config.sync.reconcile_interval_secs);
    info!("Press Ctrl+C to stop");
    info!("========================================");
    info!("");
}

fn print_shutdown(name: &str) {
    info!("");
    info!("========================================");
    info!("{} stopped gracefully", name);
    info!("========================================");
}
