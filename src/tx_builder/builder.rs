//! Incremental, value-based extrinsic assembly
//!
//! [`ExtrinsicBuilder`] is a plain value: every `with_*` / `adding_*` call
//! consumes the builder and returns the updated one. Chain parameters come
//! in through [`ExtrinsicBuilder::new`] and [`ExtrinsicBuilder::with_era`];
//! per-transaction content comes from the caller's indexed closure.
//!
//! Payloads and extrinsics are bincode-encoded and long payloads are hashed
//! with SHA-256 before signing. The layout follows the Substrate extrinsic
//! structure but is not SCALE, and the hash is not blake2-256.

use super::context::SigningContext;
use super::era::Era;
use super::errors::TransactionBuilderError;
use crate::runtime::CoderFactory;
use crate::signer::SigningWrapper;
use crate::types::{AccountId, Balance, BlockHash, Nonce, RuntimeCall, SignaturePayloadFormat};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Payloads longer than this are hashed (SHA-256) before signing
pub const MAX_UNHASHED_PAYLOAD_LEN: usize = 256;

const EXTRINSIC_VERSION: u8 = 4;
const SIGNED_FLAG: u8 = 0b1000_0000;

/// How several calls of one transaction are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchType {
    /// `Utility.batch_all`: all or nothing
    #[default]
    Atomic,
    /// `Utility.batch`: stops at the first failing call
    Untrusted,
    /// `Utility.force_batch`: continues past failing calls
    IgnoreFails,
}

impl BatchType {
    pub fn function(&self) -> &'static str {
        match self {
            BatchType::Atomic => "batch_all",
            BatchType::Untrusted => "batch",
            BatchType::IgnoreFails => "force_batch",
        }
    }
}

/// Chain-specific signed extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedExtension {
    pub name: String,
    /// Bytes included in the extrinsic
    pub extra: Vec<u8>,
    /// Bytes only included in the signing payload
    pub additional: Vec<u8>,
}

impl SignedExtension {
    pub fn new(name: impl Into<String>, extra: Vec<u8>, additional: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            extra,
            additional,
        }
    }
}

#[derive(Serialize)]
struct SigningPayload<'a> {
    call: Vec<u8>,
    era: Vec<u8>,
    nonce: Nonce,
    tip: Balance,
    extra: Vec<&'a [u8]>,
    spec_version: u32,
    transaction_version: u32,
    genesis_hash: [u8; 32],
    block_hash: [u8; 32],
    additional: Vec<&'a [u8]>,
}

#[derive(Serialize)]
struct SignatureEnvelope<'a> {
    address: &'a [u8],
    signature: &'a [u8],
    era: Vec<u8>,
    nonce: Nonce,
    tip: Balance,
    extra: Vec<&'a [u8]>,
}

#[derive(Serialize)]
struct ExtrinsicEnvelope<'a> {
    version: u8,
    signature: Option<SignatureEnvelope<'a>>,
    call: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtrinsicBuilder {
    spec_version: u32,
    transaction_version: u32,
    genesis_hash: BlockHash,
    calls: Vec<RuntimeCall>,
    era: Era,
    block_hash: BlockHash,
    nonce: Nonce,
    tip: Balance,
    address: Option<AccountId>,
    signature_payload_format: SignaturePayloadFormat,
    batch_type: BatchType,
    extensions: Vec<SignedExtension>,
    signature: Option<Vec<u8>>,
}

impl ExtrinsicBuilder {
    /// Immortal builder anchored at genesis
    pub fn new(spec_version: u32, transaction_version: u32, genesis_hash: BlockHash) -> Self {
        Self {
            spec_version,
            transaction_version,
            genesis_hash,
            calls: Vec::new(),
            era: Era::Immortal,
            block_hash: genesis_hash,
            nonce: 0,
            tip: 0,
            address: None,
            signature_payload_format: SignaturePayloadFormat::Regular,
            batch_type: BatchType::default(),
            extensions: Vec::new(),
            signature: None,
        }
    }

    pub fn with_era(mut self, era: Era, block_hash: BlockHash) -> Self {
        self.era = era;
        self.block_hash = block_hash;
        self
    }

    pub fn with_tip(mut self, tip: Balance) -> Self {
        self.tip = tip;
        self
    }

    pub fn with_nonce(mut self, nonce: Nonce) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_address(mut self, address: AccountId) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_signature_payload_format(mut self, format: SignaturePayloadFormat) -> Self {
        self.signature_payload_format = format;
        self
    }

    pub fn with_batch_type(mut self, batch_type: BatchType) -> Self {
        self.batch_type = batch_type;
        self
    }

    pub fn adding_call(mut self, call: RuntimeCall) -> Self {
        self.calls.push(call);
        self
    }

    pub fn adding_extension(mut self, extension: SignedExtension) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn reset_calls(mut self) -> Self {
        self.calls.clear();
        self
    }

    pub fn get_calls(&self) -> &[RuntimeCall] {
        &self.calls
    }

    pub fn nonce(&self) -> Nonce {
        self.nonce
    }

    pub fn tip(&self) -> Balance {
        self.tip
    }

    pub fn era(&self) -> Era {
        self.era
    }

    pub fn block_hash(&self) -> BlockHash {
        self.block_hash
    }

    pub fn address(&self) -> Option<&AccountId> {
        self.address.as_ref()
    }

    pub fn signature_payload_format(&self) -> SignaturePayloadFormat {
        self.signature_payload_format
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Single call of the transaction; several calls become a utility batch
    pub fn combined_call(&self) -> Result<RuntimeCall, TransactionBuilderError> {
        match self.calls.as_slice() {
            [] => Err(TransactionBuilderError::Incomplete(
                "transaction has no calls".to_string(),
            )),
            [call] => Ok(call.clone()),
            calls => Ok(RuntimeCall::new(
                "Utility",
                self.batch_type.function(),
                serde_json::json!({ "calls": calls }),
            )),
        }
    }

    fn extras(&self) -> Vec<&[u8]> {
        self.extensions.iter().map(|ext| ext.extra.as_slice()).collect()
    }

    /// Bytes the sender's signature commits to
    pub fn signing_payload(&self, coder: &CoderFactory) -> Result<Vec<u8>, TransactionBuilderError> {
        let payload = SigningPayload {
            call: coder.encode_call(&self.combined_call()?)?,
            era: self.era.encode(),
            nonce: self.nonce,
            tip: self.tip,
            extra: self.extras(),
            spec_version: self.spec_version,
            transaction_version: self.transaction_version,
            genesis_hash: self.genesis_hash.0,
            block_hash: self.block_hash.0,
            additional: self
                .extensions
                .iter()
                .map(|ext| ext.additional.as_slice())
                .collect(),
        };
        coder.encode(&payload)
    }

    /// Sign the payload with `signer`; the sender address must be set
    pub fn signing(
        mut self,
        signer: &dyn SigningWrapper,
        context: &SigningContext,
        coder: &CoderFactory,
    ) -> Result<Self, TransactionBuilderError> {
        if self.address.is_none() {
            return Err(TransactionBuilderError::Incomplete(
                "sender address is not set".to_string(),
            ));
        }

        let payload = self.signing_payload(coder)?;
        let message = match self.signature_payload_format {
            SignaturePayloadFormat::Regular if payload.len() > MAX_UNHASHED_PAYLOAD_LEN => {
                Sha256::digest(&payload).to_vec()
            }
            _ => payload,
        };

        self.signature = Some(signer.sign(&message, context)?);
        Ok(self)
    }

    /// Encode the final extrinsic, signed if a signature is present
    pub fn build(&self, coder: &CoderFactory) -> Result<Vec<u8>, TransactionBuilderError> {
        let call = coder.encode_call(&self.combined_call()?)?;

        let signature = match (&self.signature, &self.address) {
            (Some(signature), Some(address)) => Some(SignatureEnvelope {
                address: address.as_bytes(),
                signature,
                era: self.era.encode(),
                nonce: self.nonce,
                tip: self.tip,
                extra: self.extras(),
            }),
            (Some(_), None) => {
                return Err(TransactionBuilderError::Incomplete(
                    "signed transaction without sender address".to_string(),
                ))
            }
            _ => None,
        };

        let version = if signature.is_some() {
            EXTRINSIC_VERSION | SIGNED_FLAG
        } else {
            EXTRINSIC_VERSION
        };

        coder.encode(&ExtrinsicEnvelope {
            version,
            signature,
            call,
        })
    }
}
