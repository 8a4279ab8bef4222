//! Wallet-backed order signing

use crate::domain::order::{attach_signature, Order, UnsignedOrder};
use crate::domain::signature::{OrderSignature, SigningConvention, ETH_SIGN_SUFFIX};
use ethers::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Failed to sign order: {0}")]
    SigningError(String),

    #[error("Order seller {seller:?} is not the signing wallet {wallet:?}")]
    SellerMismatch { seller: Address, wallet: Address },
}

pub type Result<T> = std::result::Result<T, SignerError>;

/// Signs orders on behalf of one seller
pub struct OrderSigner {
    wallet: LocalWallet,
    convention: SigningConvention,
}

impl OrderSigner {
    /// Create a signer from a hex private key (with or without 0x)
    pub fn new(private_key: &str, chain_id: u64, convention: SigningConvention) -> Result<Self> {
        let key = private_key.trim_start_matches("0x");

        let wallet = key
            .parse::<LocalWallet>()
            .map_err(|_| SignerError::InvalidPrivateKey)?
            .with_chain_id(chain_id);

        Ok(Self { wallet, convention })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Sign an unsigned order and attach the signature.
    ///
    /// eth_sign signatures carry the network's type suffix byte.
    pub async fn sign(&self, unsigned: UnsignedOrder) -> Result<Order> {
        if unsigned.terms.seller != self.address() {
            return Err(SignerError::SellerMismatch {
                seller: unsigned.terms.seller,
                wallet: self.address(),
            });
        }

        let signature = match self.convention {
            SigningConvention::EthSign => {
                let signed = self
                    .wallet
                    .sign_message(unsigned.hash.as_bytes())
                    .await
                    .map_err(|e| SignerError::SigningError(e.to_string()))?;
                OrderSignature::from_ethers(signed, Some(ETH_SIGN_SUFFIX))
            }
            SigningConvention::Raw => {
                let signed = self
                    .wallet
                    .sign_hash(unsigned.hash)
                    .map_err(|e| SignerError::SigningError(e.to_string()))?;
                OrderSignature::from_ethers(signed, None)
            }
        };

        Ok(attach_signature(unsigned, signature.to_bytes()))
    }
}
