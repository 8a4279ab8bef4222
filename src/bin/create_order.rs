//! Create, sign and announce a sell listing
//!
//! Requires environment variables in `.env`:
//!   - PRIVATE_KEY (with or without 0x prefix) - the seller address is derived from this
//!
//! Usage:
//!   cargo run --bin create-order -- <collection> <token_id> <price> [--local]
//!
//! `price` is in whole units of the ask currency (e.g. 0.25).
//! `--local` stores the listing without announcing it to peers and relays.

use anyhow::{Context, Result};
use ethers::types::{Address, U256};
use ethers::utils::parse_ether;
use orderbook::application::{init_logging_with_level, OrderbookApp};
use orderbook::domain::encode_orders;
use orderbook::infrastructure::{OrderSigner, OrderbookConfig};
use smolpuddle::bin_common::{load_config_from_env, parse_args, ConfigType};
use std::time::Duration;
use tracing::{info, warn};

/// Time given to the gossip writer to flush the announcement before exit
const GOSSIP_FLUSH: Duration = Duration::from_secs(2);
/// How long to wait for the gossip relay before announcing over HTTP only
const GOSSIP_CONNECT: Duration = Duration::from_secs(10);

fn print_usage() {
    println!("Create Listing");
    println!();
    println!("Usage: create-order <collection> <token_id> <price> [--local]");
    println!();
    println!("Arguments:");
    println!("  collection  NFT contract address");
    println!("  token_id    Token id within the collection");
    println!("  price       Ask in whole currency units (18 decimals)");
    println!("  --local     Store only, do not broadcast");
    println!();
    println!("Environment Variables (set in .env file):");
    println!("  PRIVATE_KEY  Seller private key");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = parse_args();
    let positional: Vec<&String> = args.iter().filter(|arg| !arg.starts_with("--")).collect();
    if positional.len() < 3 {
        print_usage();
        return Ok(());
    }
    let broadcast = !args.iter().any(|arg| arg == "--local");

    let collection: Address = positional[0]
        .parse()
        .with_context(|| format!("Invalid collection address '{}'", positional[0]))?;
    let token_id = U256::from_dec_str(positional[1])
        .with_context(|| format!("Invalid token id '{}'", positional[1]))?;
    let price: U256 = parse_ether(positional[2])
        .with_context(|| format!("Invalid price '{}'", positional[2]))?;

    let config = OrderbookConfig::load(load_config_from_env(ConfigType::Orderbook))?;
    init_logging_with_level(&config.log_level);

    let private_key = OrderbookConfig::private_key()?;
    let signer = OrderSigner::new(
        &private_key,
        config.chain.chain_id,
        config.market.signing_convention,
    )?;
    info!(seller = ?signer.address(), "Loaded signer");

    let app = OrderbookApp::new(config).await?;
    if broadcast && !app.wait_for_gossip(GOSSIP_CONNECT).await {
        warn!("Gossip relay unreachable, announcing to HTTP relays only");
    }
    let order = app
        .create_listing(&signer, collection, token_id, price, broadcast)
        .await?;

    if broadcast {
        app.shutdown.interruptible_sleep(GOSSIP_FLUSH).await;
    }
    app.shutdown.trigger();

    println!("{}", serde_json::to_string_pretty(&encode_orders(&[order])?)?);
    Ok(())
}
