//! Outputs of the batch construction pipeline

use super::sender::ExtrinsicSenderResolution;
use crate::types::{IndexedResult, Nonce};
use sha2::{Digest, Sha256};

/// Ordered per-index results; order equals the caller's index order
pub type IndexedResults<T> = Vec<IndexedResult<T>>;

/// A signed and encoded extrinsic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedExtrinsic {
    pub nonce: Nonce,
    pub data: Vec<u8>,
}

impl SignedExtrinsic {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.data))
    }

    /// Local hash of the encoded bytes
    pub fn hash(&self) -> String {
        format!("0x{}", hex::encode(Sha256::digest(&self.data)))
    }
}

/// Result of building a batch of extrinsics
#[derive(Debug, Clone, PartialEq)]
pub struct ExtrinsicsCreationResult {
    pub extrinsics: IndexedResults<SignedExtrinsic>,
    pub sender: ExtrinsicSenderResolution,
}

impl ExtrinsicsCreationResult {
    pub fn succeeded(&self) -> usize {
        self.extrinsics.iter().filter(|item| item.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.extrinsics.len() - self.succeeded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx_builder::TransactionBuilderError;
    use crate::types::{AccountId, ChainAccount, CryptoType};

    #[test]
    fn test_counts() {
        let result = ExtrinsicsCreationResult {
            extrinsics: vec![
                IndexedResult::new(0, Ok(SignedExtrinsic { nonce: 1, data: vec![1] })),
                IndexedResult::new(1, Err(TransactionBuilderError::signing("locked"))),
            ],
            sender: ExtrinsicSenderResolution::current(ChainAccount::new(
                AccountId::new(vec![0; 32]),
                CryptoType::Ed25519,
            )),
        };
        assert_eq!(result.succeeded(), 1);
        assert_eq!(result.failed(), 1);
    }

    #[test]
    fn test_hex_and_hash() {
        let extrinsic = SignedExtrinsic { nonce: 0, data: vec![0xde, 0xad] };
        assert_eq!(extrinsic.to_hex(), "0xdead");
        assert_eq!(extrinsic.hash().len(), 2 + 64);
    }
}
