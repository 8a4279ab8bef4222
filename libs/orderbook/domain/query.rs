//! Listing queries against the local order store

use super::order::{Order, OrderStatus};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Ask amount
    #[default]
    Price,
    /// Expiration, which doubles as listing time for new listings
    Expiration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Sort choices offered to users browsing listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingSort {
    LowHighPrice,
    HighLowPrice,
    RecentListing,
}

impl ListingSort {
    pub fn sort_and_direction(self) -> (SortBy, Direction) {
        match self {
            ListingSort::LowHighPrice => (SortBy::Price, Direction::Asc),
            ListingSort::HighLowPrice => (SortBy::Price, Direction::Desc),
            ListingSort::RecentListing => (SortBy::Expiration, Direction::Desc),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
    pub status: OrderStatus,
    /// Restrict to one NFT collection
    pub collection: Option<Address>,
    pub sort_by: SortBy,
    pub direction: Direction,
    /// Range start on the sort value: a floor when ascending, a ceiling when descending
    pub from: Option<U256>,
    pub offset: u64,
    pub limit: u64,
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            status: OrderStatus::Open,
            collection: None,
            sort_by: SortBy::Price,
            direction: Direction::Asc,
            from: None,
            offset: 0,
            limit: 10,
        }
    }
}

impl OrderQuery {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn in_collection(mut self, collection: Address) -> Self {
        self.collection = Some(collection);
        self
    }

    pub fn sorted(mut self, sort: ListingSort) -> Self {
        let (sort_by, direction) = sort.sort_and_direction();
        self.sort_by = sort_by;
        self.direction = direction;
        self
    }

    pub fn starting_from(mut self, from: U256) -> Self {
        self.from = Some(from);
        self
    }

    pub fn page(mut self, offset: u64, limit: u64) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

/// One page of query results
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    /// Distinct listed tokens matching the filter, across all pages
    pub total: u64,
}
