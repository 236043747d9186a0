//! Signing context handed to the signer for every transaction
//!
//! The signer sees the resolved sender (including any delegation) and the
//! full call set, so delegated and plain-account signatures can differ.

use super::sender::ExtrinsicSenderResolution;
use crate::types::{AccountId, CryptoType, RuntimeCall};

#[derive(Debug, Clone, PartialEq)]
pub enum SigningContext {
    Substrate {
        sender_resolution: ExtrinsicSenderResolution,
        calls: Vec<RuntimeCall>,
    },
    Evm {
        address: AccountId,
        chain_id: u64,
    },
}

impl SigningContext {
    /// Signature scheme the signature must be produced with
    pub fn crypto_type(&self) -> CryptoType {
        match self {
            SigningContext::Substrate {
                sender_resolution, ..
            } => sender_resolution.account.crypto_type,
            SigningContext::Evm { .. } => CryptoType::Ethereum,
        }
    }

    /// Account whose key must sign
    pub fn signer_account(&self) -> &AccountId {
        match self {
            SigningContext::Substrate {
                sender_resolution, ..
            } => &sender_resolution.account.account_id,
            SigningContext::Evm { address, .. } => address,
        }
    }
}
