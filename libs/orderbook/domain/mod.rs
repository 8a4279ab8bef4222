//! Domain Layer
//!
//! Order entities, their wire format, hashing and signatures.
//! This layer has no dependencies on infrastructure or application layers.

pub mod encoding;
pub mod hashing;
pub mod order;
pub mod query;
pub mod signature;
pub mod wire;

pub use hashing::{Eip712Domain, HashingScheme, OrderHasher};
pub use order::{
    attach_signature, listing_expiration, random_salt, Asset, ChainOrderStatus, Fee, Order,
    OrderError, OrderKind, OrderStatus, OrderTerms, StoredOrder, UnsignedOrder,
};
pub use query::{Direction, ListingSort, OrderPage, OrderQuery, SortBy};
pub use signature::{OrderSignature, SignatureError, SigningConvention, ETH_SIGN_SUFFIX};
pub use wire::{decode_orders, encode_orders, is_order_array};
