//! Order hashing
//!
//! The hash must match byte-for-byte what the marketplace contract computes
//! from the same fields, otherwise orders look valid but can never be executed
//! or canceled. Two schemes exist across deployments:
//!
//! - `Abi`: `keccak256(abi.encode(orderTuple))`, the tuple accepted by `swap`
//! - `Eip712`: `keccak256("\x19\x01" || domainSeparator || structHash)`

use super::encoding::{encode_address, encode_bytes32, encode_uint256};
use super::order::{Order, OrderTerms};
use ethers::abi::{encode, Token};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

/// Solidity type of the order struct, field order matters
pub const ORDER_TYPE: &str = "Order(address seller,uint256 orderType,address askToken,address sellToken,uint256 askTokenIdOrAmount,uint256 sellTokenIdOrAmount,address[] feeRecipients,uint256[] feeAmountsOrIds,uint256 expiration,bytes32 salt)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashingScheme {
    #[default]
    Abi,
    Eip712,
}

/// EIP-712 domain of the marketplace contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

/// Computes order hashes under one fixed scheme
#[derive(Debug, Clone)]
pub struct OrderHasher {
    scheme: HashingScheme,
    domain_separator: [u8; 32],
}

impl OrderHasher {
    /// Plain ABI tuple hashing
    pub fn abi() -> Self {
        Self {
            scheme: HashingScheme::Abi,
            domain_separator: [0u8; 32],
        }
    }

    /// EIP-712 typed hashing bound to a domain
    pub fn eip712(domain: &Eip712Domain) -> Self {
        Self {
            scheme: HashingScheme::Eip712,
            domain_separator: compute_domain_separator(domain),
        }
    }

    pub fn scheme(&self) -> HashingScheme {
        self.scheme
    }

    pub fn compute_hash(&self, terms: &OrderTerms) -> H256 {
        let hash = match self.scheme {
            HashingScheme::Abi => compute_abi_hash(terms),
            HashingScheme::Eip712 => compute_eip712_hash(terms, &self.domain_separator),
        };
        H256::from(hash)
    }

    /// Recompute the hash of a received order from its fields
    pub fn hash_order(&self, order: &Order) -> H256 {
        self.compute_hash(&order.terms())
    }
}

impl Default for OrderHasher {
    fn default() -> Self {
        Self::abi()
    }
}

fn order_tuple(terms: &OrderTerms) -> Token {
    let fee_recipients = terms
        .fees
        .iter()
        .map(|fee| Token::Address(fee.recipient))
        .collect();
    let fee_amounts = terms
        .fees
        .iter()
        .map(|fee| Token::Uint(fee.amount_or_id))
        .collect();

    Token::Tuple(vec![
        Token::Address(terms.seller),
        Token::Uint(U256::from(terms.kind.as_u64())),
        Token::Address(terms.ask.token),
        Token::Address(terms.sell.token),
        Token::Uint(terms.ask.amount_or_id),
        Token::Uint(terms.sell.amount_or_id),
        Token::Array(fee_recipients),
        Token::Array(fee_amounts),
        Token::Uint(terms.expiration),
        Token::FixedBytes(terms.salt.as_bytes().to_vec()),
    ])
}

/// hash = keccak256(abi.encode(tuple(...)))
pub fn compute_abi_hash(terms: &OrderTerms) -> [u8; 32] {
    keccak256(encode(&[order_tuple(terms)]))
}

/// Compute the EIP-712 domain separator
///
/// domainSeparator = keccak256(
///     keccak256("EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)") ||
///     keccak256(name) || keccak256(version) || chainId || verifyingContract
/// )
pub fn compute_domain_separator(domain: &Eip712Domain) -> [u8; 32] {
    let type_hash = keccak256(
        b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
    );

    let mut encoded = Vec::with_capacity(160);
    encoded.extend_from_slice(&type_hash);
    encoded.extend_from_slice(&keccak256(domain.name.as_bytes()));
    encoded.extend_from_slice(&keccak256(domain.version.as_bytes()));
    encoded.extend_from_slice(&encode_uint256(U256::from(domain.chain_id)));
    encoded.extend_from_slice(&encode_address(domain.verifying_contract));

    keccak256(&encoded)
}

/// Compute the struct hash of the order terms
///
/// Dynamic arrays are encoded as the keccak256 of their concatenated words.
pub fn compute_struct_hash(terms: &OrderTerms) -> [u8; 32] {
    let type_hash = keccak256(ORDER_TYPE.as_bytes());

    let recipients: Vec<u8> = terms
        .fees
        .iter()
        .flat_map(|fee| encode_address(fee.recipient))
        .collect();
    let amounts: Vec<u8> = terms
        .fees
        .iter()
        .flat_map(|fee| encode_uint256(fee.amount_or_id))
        .collect();

    let mut encoded = Vec::with_capacity(352);
    encoded.extend_from_slice(&type_hash);
    encoded.extend_from_slice(&encode_address(terms.seller));
    encoded.extend_from_slice(&encode_uint256(U256::from(terms.kind.as_u64())));
    encoded.extend_from_slice(&encode_address(terms.ask.token));
    encoded.extend_from_slice(&encode_address(terms.sell.token));
    encoded.extend_from_slice(&encode_uint256(terms.ask.amount_or_id));
    encoded.extend_from_slice(&encode_uint256(terms.sell.amount_or_id));
    encoded.extend_from_slice(&keccak256(&recipients));
    encoded.extend_from_slice(&keccak256(&amounts));
    encoded.extend_from_slice(&encode_uint256(terms.expiration));
    encoded.extend_from_slice(&encode_bytes32(terms.salt));

    keccak256(&encoded)
}

/// hash = keccak256("\x19\x01" || domainSeparator || structHash)
pub fn compute_eip712_hash(terms: &OrderTerms, domain_separator: &[u8; 32]) -> [u8; 32] {
    let struct_hash = compute_struct_hash(terms);

    let mut message = Vec::with_capacity(66);
    message.extend_from_slice(b"\x19\x01");
    message.extend_from_slice(domain_separator);
    message.extend_from_slice(&struct_hash);

    keccak256(&message)
}
