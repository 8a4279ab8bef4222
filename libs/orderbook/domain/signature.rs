//! Order signatures
//!
//! Signatures on the network are 65 bytes `r || s || v`, usually followed by a
//! single signature-type byte (`0x02` means eth_sign).

use ethers::types::{Address, Bytes, RecoveryMessage, Signature, H256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Signature-type suffix byte for eth_sign signatures
pub const ETH_SIGN_SUFFIX: u8 = 0x02;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Invalid signature length: {0} bytes")]
    InvalidLength(usize),

    #[error("Invalid recovery id: {0}")]
    InvalidRecoveryId(u64),

    #[error("Recovery failed: {0}")]
    RecoveryFailed(String),
}

pub type Result<T> = std::result::Result<T, SignatureError>;

/// How the order hash is turned into the signed digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningConvention {
    /// EIP-191 personal message over the 32 raw hash bytes
    #[default]
    EthSign,
    /// The hash itself is the digest
    Raw,
}

impl SigningConvention {
    fn message(self, hash: H256) -> RecoveryMessage {
        match self {
            SigningConvention::EthSign => RecoveryMessage::Data(hash.as_bytes().to_vec()),
            SigningConvention::Raw => RecoveryMessage::Hash(hash),
        }
    }
}

/// Parsed `(r, s, v)` signature plus the optional type suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSignature {
    pub r: U256,
    pub s: U256,
    pub v: u64,
    pub suffix: Option<u8>,
}

impl OrderSignature {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let suffix = match bytes.len() {
            65 => None,
            66 => Some(bytes[65]),
            other => return Err(SignatureError::InvalidLength(other)),
        };

        Ok(Self {
            r: U256::from_big_endian(&bytes[0..32]),
            s: U256::from_big_endian(&bytes[32..64]),
            v: u64::from(bytes[64]),
            suffix,
        })
    }

    pub fn from_ethers(signature: Signature, suffix: Option<u8>) -> Self {
        Self {
            r: signature.r,
            s: signature.s,
            v: signature.v,
            suffix,
        }
    }

    /// `v` is 27 or 28
    pub fn is_canonical(&self) -> bool {
        self.v == 27 || self.v == 28
    }

    /// Legacy `v` of 0/1 lifted to 27/28; anything else is left alone
    pub fn normalized(&self) -> Self {
        let mut normalized = *self;
        if self.v < 2 {
            normalized.v = self.v + 27;
        }
        normalized
    }

    /// Recover the signer of `hash` under the given convention.
    ///
    /// Only canonical signatures are recovered; callers normalize first.
    pub fn recover(&self, hash: H256, convention: SigningConvention) -> Result<Address> {
        if !self.is_canonical() {
            return Err(SignatureError::InvalidRecoveryId(self.v));
        }

        let signature = Signature {
            r: self.r,
            s: self.s,
            v: self.v,
        };

        signature
            .recover(convention.message(hash))
            .map_err(|e| SignatureError::RecoveryFailed(e.to_string()))
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut out = Vec::with_capacity(66);
        let mut word = [0u8; 32];

        self.r.to_big_endian(&mut word);
        out.extend_from_slice(&word);
        self.s.to_big_endian(&mut word);
        out.extend_from_slice(&word);
        // v fits a byte for every parsed signature
        out.push(self.v as u8);

        if let Some(suffix) = self.suffix {
            out.push(suffix);
        }

        Bytes::from(out)
    }
}
