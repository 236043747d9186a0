//! Fee reuse identifiers
//!
//! Two requests with the same economically relevant inputs share a fee
//! estimate. The identifier is the SHA-256 of a canonical JSON document
//! tagged with the request kind, so a transfer and a swap never collide.

use crate::types::{AccountId, Balance};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionFeeId(String);

impl TransactionFeeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_tagged<T: Serialize>(tag: &str, args: &T) -> Self {
        #[derive(Serialize)]
        struct Tagged<'a, T> {
            kind: &'a str,
            args: &'a T,
        }

        // Serializing these plain structs cannot fail
        let canonical = serde_json::to_vec(&Tagged { kind: tag, args }).unwrap_or_default();
        Self(hex::encode(Sha256::digest(&canonical)))
    }
}

impl fmt::Display for TransactionFeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<TransactionFeeId> for String {
    fn from(id: TransactionFeeId) -> Self {
        id.0
    }
}

/// Inputs of a transfer fee estimate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferFeeArgs {
    pub asset: String,
    amount: String,
    pub recipient: Option<String>,
}

impl TransferFeeArgs {
    pub fn new(asset: impl Into<String>, amount: Balance, recipient: Option<&AccountId>) -> Self {
        Self {
            asset: asset.into(),
            amount: amount.to_string(),
            recipient: recipient.map(AccountId::to_hex),
        }
    }

    pub fn identifier(&self) -> TransactionFeeId {
        TransactionFeeId::from_tagged("transfer", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapDirection {
    Sell,
    Buy,
}

/// Inputs of a swap fee estimate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapFeeArgs {
    pub asset_in: String,
    amount_in: String,
    pub asset_out: String,
    amount_out: String,
    pub receiver: String,
    pub direction: SwapDirection,
    /// Slippage in basis points
    pub slippage_bps: u32,
}

impl SwapFeeArgs {
    pub fn new(
        asset_in: impl Into<String>,
        amount_in: Balance,
        asset_out: impl Into<String>,
        amount_out: Balance,
        receiver: &AccountId,
        direction: SwapDirection,
        slippage_bps: u32,
    ) -> Self {
        Self {
            asset_in: asset_in.into(),
            amount_in: amount_in.to_string(),
            asset_out: asset_out.into(),
            amount_out: amount_out.to_string(),
            receiver: receiver.to_hex(),
            direction,
            slippage_bps,
        }
    }

    pub fn identifier(&self) -> TransactionFeeId {
        TransactionFeeId::from_tagged("swap", self)
    }
}
