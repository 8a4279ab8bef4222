//! Browse open listings in the local order store
//!
//! Usage:
//!   cargo run --bin list-orders -- [collection|all] [sort] [offset] [limit] [from]
//!
//! Sorts: `low-high` (default), `high-low`, `recent`.
//! `from` is a price floor for ascending sorts and a ceiling for descending ones.

use anyhow::{bail, Context, Result};
use ethers::types::{Address, U256};
use ethers::utils::format_ether;
use orderbook::application::init_logging_with_level;
use orderbook::domain::{ListingSort, OrderQuery, SortBy};
use orderbook::infrastructure::{OrderDatabase, OrderbookConfig};
use smolpuddle::bin_common::{load_config_from_env, parse_args, ConfigType};

fn print_usage() {
    println!("List Orders");
    println!();
    println!("Usage: list-orders [collection|all] [sort] [offset] [limit] [from]");
    println!();
    println!("Arguments:");
    println!("  collection  NFT contract address, or 'all' (default)");
    println!("  sort        'low-high' (default), 'high-low' or 'recent'");
    println!("  offset      Rows to skip (default 0)");
    println!("  limit       Page size (default 10)");
    println!("  from        Range start on the sort value, in wei");
}

fn parse_sort(s: &str) -> Result<ListingSort> {
    match s.to_lowercase().as_str() {
        "low-high" | "asc" => Ok(ListingSort::LowHighPrice),
        "high-low" | "desc" => Ok(ListingSort::HighLowPrice),
        "recent" => Ok(ListingSort::RecentListing),
        _ => bail!("Invalid sort '{}'. Use 'low-high', 'high-low' or 'recent'", s),
    }
}

fn build_query(args: &[String]) -> Result<OrderQuery> {
    let mut query = OrderQuery::open();

    if let Some(collection) = args.first().filter(|arg| arg.as_str() != "all") {
        let address: Address = collection
            .parse()
            .with_context(|| format!("Invalid collection address '{}'", collection))?;
        query = query.in_collection(address);
    }
    if let Some(sort) = args.get(1) {
        query = query.sorted(parse_sort(sort)?);
    }

    let offset = args.get(2).map(|s| s.parse::<u64>()).transpose()?.unwrap_or(0);
    let limit = args.get(3).map(|s| s.parse::<u64>()).transpose()?.unwrap_or(10);
    query = query.page(offset, limit);

    if let Some(from) = args.get(4) {
        let from = U256::from_dec_str(from).with_context(|| format!("Invalid range start '{}'", from))?;
        query = query.starting_from(from);
    }

    Ok(query)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = parse_args();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_usage();
        return Ok(());
    }

    let config = OrderbookConfig::load(load_config_from_env(ConfigType::Orderbook))?;
    init_logging_with_level(&config.log_level);

    let query = build_query(&args)?;
    let database = OrderDatabase::new(&config.database.url).await?;
    let page = database.query_orders(&query).await?;

    println!();
    println!("════════════════════════════════════════════════════════════════");
    println!(
        "OPEN LISTINGS  {} - {} of {}",
        query.offset + u64::from(!page.orders.is_empty()),
        query.offset + page.orders.len() as u64,
        page.total
    );
    println!("════════════════════════════════════════════════════════════════");

    for order in &page.orders {
        let sort_value = match query.sort_by {
            SortBy::Price => format!("{} ", format_ether(order.ask.amount_or_id)),
            SortBy::Expiration => format!("exp {} ", order.expiration),
        };
        println!(
            "  {:?} #{:<8} {}by {:?}",
            order.collection(),
            order.token_id(),
            sort_value,
            order.seller
        );
        println!("      hash {:?}", order.hash);
    }
    println!();

    database.close().await;
    Ok(())
}
