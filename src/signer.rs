//! Signing collaborators
//!
//! Signing is synchronous and runs inside the per-index signing step of a
//! batch. A failure is reported for that index only.

use crate::tx_builder::{SigningContext, TransactionBuilderError};
use crate::types::{AccountId, ChainAccount, CryptoType};
use ed25519_dalek::{Signer, SigningKey};
use std::path::Path;
use zeroize::Zeroizing;

/// Produces a signature over a payload for the sender described by `context`
pub trait SigningWrapper: Send + Sync {
    fn sign(&self, payload: &[u8], context: &SigningContext) -> Result<Vec<u8>, TransactionBuilderError>;
}

/// Local ed25519 key
pub struct Ed25519SigningWrapper {
    key: SigningKey,
}

impl std::fmt::Debug for Ed25519SigningWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519SigningWrapper")
            .field("account", &self.account_id())
            .finish()
    }
}

impl Ed25519SigningWrapper {
    pub fn from_seed(seed: &[u8]) -> Result<Self, TransactionBuilderError> {
        let seed: [u8; 32] = seed.try_into().map_err(|_| {
            TransactionBuilderError::Configuration(format!(
                "Invalid seed length: expected 32 bytes, got {}",
                seed.len()
            ))
        })?;
        let seed = Zeroizing::new(seed);
        if seed.iter().all(|&b| b == 0) {
            return Err(TransactionBuilderError::Configuration(
                "Invalid seed: all-zero key rejected".to_string(),
            ));
        }
        Ok(Self {
            key: SigningKey::from_bytes(&seed),
        })
    }

    /// Read a hex-encoded 32-byte seed from `path`
    pub fn from_key_file(path: impl AsRef<Path>) -> Result<Self, TransactionBuilderError> {
        let content = Zeroizing::new(
            std::fs::read_to_string(path.as_ref())
                .map_err(|err| TransactionBuilderError::Configuration(format!("Failed to read key file: {}", err)))?,
        );
        let seed = Zeroizing::new(
            hex::decode(content.trim().trim_start_matches("0x"))
                .map_err(|err| TransactionBuilderError::Configuration(format!("Invalid key file: {}", err)))?,
        );
        Self::from_seed(&seed)
    }

    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    pub fn account_id(&self) -> AccountId {
        AccountId::new(self.key.verifying_key().to_bytes().to_vec())
    }

    pub fn chain_account(&self) -> ChainAccount {
        ChainAccount::new(self.account_id(), CryptoType::Ed25519)
    }
}

impl SigningWrapper for Ed25519SigningWrapper {
    fn sign(&self, payload: &[u8], context: &SigningContext) -> Result<Vec<u8>, TransactionBuilderError> {
        if context.signer_account() != &self.account_id() {
            return Err(TransactionBuilderError::signing(format!(
                "key does not belong to {}",
                context.signer_account()
            )));
        }
        Ok(self.key.sign(payload).to_bytes().to_vec())
    }
}

/// Placeholder signer for fee estimation.
///
/// Produces a zero signature sized for the resolved sender's scheme so the
/// encoded length, and therefore the fee, matches a real transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummySigningWrapper;

impl SigningWrapper for DummySigningWrapper {
    fn sign(&self, _payload: &[u8], context: &SigningContext) -> Result<Vec<u8>, TransactionBuilderError> {
        Ok(vec![0u8; context.crypto_type().signature_len()])
    }
}
