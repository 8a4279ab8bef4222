//! ABI word encoding helpers and storage sort keys

use ethers::types::{Address, H256, U256};

/// Decimal digits of `U256::MAX`
pub const SORT_KEY_WIDTH: usize = 78;

/// Encode a U256 as 32 bytes (big-endian, left-padded)
pub fn encode_uint256(value: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    buf
}

/// Encode an address as 32 bytes (left-padded with zeros)
pub fn encode_address(addr: Address) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[12..].copy_from_slice(addr.as_bytes());
    buf
}

/// Encode a bytes32 value as a word
pub fn encode_bytes32(value: H256) -> [u8; 32] {
    value.to_fixed_bytes()
}

/// Zero-padded decimal projection of a U256.
///
/// Lexicographic order of the keys equals numeric order of the values, so the
/// storage indexes can range-scan prices without losing precision.
pub fn sort_key(value: U256) -> String {
    format!("{:0>width$}", value.to_string(), width = SORT_KEY_WIDTH)
}
