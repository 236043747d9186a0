//! Common types used throughout the pipeline

use crate::tx_builder::TransactionBuilderError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type BlockNumber = u32;
pub type Balance = u128;

/// Substrate account index
pub type Nonce = u32;

/// Raw account identifier: 32 bytes on Substrate chains, 20 on EVM chains
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(Vec<u8>);

impl AccountId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse a hex string with or without the `0x` prefix
    pub fn from_hex(value: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(value.trim_start_matches("0x")).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.to_hex())
    }
}

/// 32-byte block hash
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    pub fn from_hex(value: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(value.trim_start_matches("0x"), &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self.to_hex())
    }
}

/// Chain family, decides which transaction service handles the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ChainFamily {
    Substrate,
    Evm { chain_id: u64 },
}

/// Static description of a chain the pipeline talks to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainModel {
    pub chain_id: String,
    pub name: String,
    pub family: ChainFamily,

    /// Tip applied to every transaction unless a builder closure overrides it
    pub default_tip: Option<Balance>,

    /// Query fees through `state_call` instead of `payment_queryInfo`
    pub fee_via_runtime_call: bool,
}

impl ChainModel {
    pub fn substrate(chain_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            name: name.into(),
            family: ChainFamily::Substrate,
            default_tip: None,
            fee_via_runtime_call: false,
        }
    }

    pub fn evm(chain_id: impl Into<String>, name: impl Into<String>, evm_chain_id: u64) -> Self {
        Self {
            chain_id: chain_id.into(),
            name: name.into(),
            family: ChainFamily::Evm {
                chain_id: evm_chain_id,
            },
            default_tip: None,
            fee_via_runtime_call: false,
        }
    }

    pub fn is_evm(&self) -> bool {
        matches!(self.family, ChainFamily::Evm { .. })
    }
}

/// Signature scheme of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CryptoType {
    Sr25519,
    Ed25519,
    Ecdsa,
    Ethereum,
}

impl CryptoType {
    /// Length in bytes of a signature produced with this scheme
    pub fn signature_len(&self) -> usize {
        match self {
            CryptoType::Sr25519 | CryptoType::Ed25519 => 64,
            CryptoType::Ecdsa | CryptoType::Ethereum => 65,
        }
    }
}

/// How the account's key is held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Key held by this process
    Regular,
    /// Hardware device signing over the raw extrinsic payload
    Ledger,
    /// Air-gapped signer scanning the raw extrinsic payload
    Vault,
}

impl AccountType {
    pub fn signature_payload_format(&self) -> SignaturePayloadFormat {
        match self {
            AccountType::Regular => SignaturePayloadFormat::Regular,
            AccountType::Ledger | AccountType::Vault => SignaturePayloadFormat::ExtrinsicPayload,
        }
    }
}

/// Rule for turning the signing payload into the bytes that get signed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignaturePayloadFormat {
    /// Payloads longer than 256 bytes are hashed before signing
    #[default]
    Regular,
    /// The raw payload is signed as-is
    ExtrinsicPayload,
}

/// The account a request is nominally made for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainAccount {
    pub account_id: AccountId,
    pub crypto_type: CryptoType,
    pub account_type: AccountType,
}

impl ChainAccount {
    pub fn new(account_id: AccountId, crypto_type: CryptoType) -> Self {
        Self {
            account_id,
            crypto_type,
            account_type: AccountType::Regular,
        }
    }

    pub fn with_account_type(mut self, account_type: AccountType) -> Self {
        self.account_type = account_type;
        self
    }
}

/// A runtime call addressed by pallet and function name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeCall {
    pub module: String,
    pub function: String,
    pub args: serde_json::Value,
}

impl RuntimeCall {
    pub fn new(module: impl Into<String>, function: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
            args,
        }
    }

    /// `Balances.transfer_keep_alive(dest, value)`
    pub fn transfer(dest: &AccountId, value: Balance) -> Self {
        Self::new(
            "Balances",
            "transfer_keep_alive",
            serde_json::json!({ "dest": dest.to_hex(), "value": value.to_string() }),
        )
    }

    pub fn path(&self) -> String {
        format!("{}.{}", self.module, self.function)
    }
}

/// Outcome for one position of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedResult<T> {
    pub index: usize,
    pub result: Result<T, TransactionBuilderError>,
}

impl<T> IndexedResult<T> {
    pub fn new(index: usize, result: Result<T, TransactionBuilderError>) -> Self {
        Self { index, result }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_hex() {
        let id = AccountId::from_hex("0x0102ff").unwrap();
        assert_eq!(id.as_bytes(), &[1, 2, 255]);
        assert_eq!(id.to_string(), "0x0102ff");
        assert_eq!(AccountId::from_hex("0102ff").unwrap(), id);
    }

    #[test]
    fn test_block_hash_requires_32_bytes() {
        assert!(BlockHash::from_hex("0x0102").is_err());
        let hex = format!("0x{}", "ab".repeat(32));
        assert_eq!(BlockHash::from_hex(&hex).unwrap().to_hex(), hex);
    }

    #[test]
    fn test_payload_format_by_account_type() {
        assert_eq!(
            AccountType::Regular.signature_payload_format(),
            SignaturePayloadFormat::Regular
        );
        assert_eq!(
            AccountType::Ledger.signature_payload_format(),
            SignaturePayloadFormat::ExtrinsicPayload
        );
    }

    #[test]
    fn test_chain_family_serde() {
        let chain = ChainModel::evm("eth", "Ethereum", 1);
        let json = serde_json::to_string(&chain.family).unwrap();
        assert_eq!(json, r#"{"type":"evm","chain_id":1}"#);
        assert!(chain.is_evm());
    }
}
