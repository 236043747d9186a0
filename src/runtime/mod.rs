//! Runtime coder and metadata source
//!
//! A [`CoderFactory`] is the snapshot of the chain runtime a batch is built
//! against: versions that go into the signing payload plus the set of calls
//! the runtime accepts. It is fetched once per request and shared by every
//! transaction of the batch.

use crate::operation::Operation;
use crate::tx_builder::TransactionBuilderError;
use crate::types::RuntimeCall;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub mod provider;

pub use provider::{RpcRuntimeProvider, StaticRuntimeProvider};

/// Source of the coder factory for one chain
pub trait RuntimeCodingService: Send + Sync {
    fn fetch_coder_factory_operation(&self) -> Operation<Arc<CoderFactory>>;
}

/// Calls known to the runtime, by pallet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeMetadata {
    modules: BTreeMap<String, BTreeSet<String>>,
}

impl RuntimeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call(mut self, module: &str, function: &str) -> Self {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(function.to_string());
        self
    }

    /// Balances, Utility, Proxy and System calls used by wallets
    pub fn standard() -> Self {
        Self::new()
            .with_call("System", "remark")
            .with_call("Balances", "transfer_keep_alive")
            .with_call("Balances", "transfer_allow_death")
            .with_call("Balances", "transfer_all")
            .with_call("Utility", "batch")
            .with_call("Utility", "batch_all")
            .with_call("Utility", "force_batch")
            .with_call("Proxy", "proxy")
            .with_call("Staking", "bond")
            .with_call("Staking", "nominate")
            .with_call("Staking", "chill")
            .with_call("Staking", "unbond")
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    pub fn has_call(&self, module: &str, function: &str) -> bool {
        self.modules
            .get(module)
            .map(|functions| functions.contains(function))
            .unwrap_or(false)
    }
}

/// Snapshot of the runtime a batch is encoded against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoderFactory {
    pub spec_version: u32,
    pub transaction_version: u32,
    pub metadata: Arc<RuntimeMetadata>,
}

#[derive(Serialize)]
struct EncodedCall<'a> {
    module: &'a str,
    function: &'a str,
    args: String,
}

impl CoderFactory {
    pub fn new(spec_version: u32, transaction_version: u32, metadata: RuntimeMetadata) -> Self {
        Self {
            spec_version,
            transaction_version,
            metadata: Arc::new(metadata),
        }
    }

    /// Fail if the runtime does not know `call` (or a call nested in it)
    pub fn validate_call(&self, call: &RuntimeCall) -> Result<(), TransactionBuilderError> {
        if !self.metadata.has_module(&call.module) {
            return Err(TransactionBuilderError::invalid_call(
                &call.module,
                &call.function,
                "unknown module",
            ));
        }
        if !self.metadata.has_call(&call.module, &call.function) {
            return Err(TransactionBuilderError::invalid_call(
                &call.module,
                &call.function,
                "unknown function",
            ));
        }

        for nested in nested_calls(call) {
            self.validate_call(&nested)?;
        }
        Ok(())
    }

    /// Bincode encoding of a call with JSON-serialised args.
    ///
    /// This is txflow's own format, not SCALE; runtimes decoding real
    /// SCALE calls will not accept it.
    pub fn encode_call(&self, call: &RuntimeCall) -> Result<Vec<u8>, TransactionBuilderError> {
        self.validate_call(call)?;
        let encoded = EncodedCall {
            module: &call.module,
            function: &call.function,
            args: call.args.to_string(),
        };
        Ok(bincode::serialize(&encoded)?)
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, TransactionBuilderError> {
        Ok(bincode::serialize(value)?)
    }
}

/// Calls embedded in `call` args (`call` or `calls` keys)
fn nested_calls(call: &RuntimeCall) -> Vec<RuntimeCall> {
    let mut nested = Vec::new();
    if let Some(inner) = call.args.get("call") {
        if let Ok(inner) = serde_json::from_value::<RuntimeCall>(inner.clone()) {
            nested.push(inner);
        }
    }
    if let Some(serde_json::Value::Array(items)) = call.args.get("calls") {
        nested.extend(
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<RuntimeCall>(item.clone()).ok()),
        );
    }
    nested
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountId;
    use serde_json::json;

    fn coder() -> CoderFactory {
        CoderFactory::new(9430, 26, RuntimeMetadata::standard())
    }

    #[test]
    fn test_validate_known_call() {
        let call = RuntimeCall::transfer(&AccountId::new(vec![1u8; 32]), 10);
        assert!(coder().validate_call(&call).is_ok());
    }

    #[test]
    fn test_validate_unknown_call() {
        let call = RuntimeCall::new("Balances", "mint", json!({}));
        let err = coder().validate_call(&call).unwrap_err();
        assert_eq!(
            err,
            TransactionBuilderError::invalid_call("Balances", "mint", "unknown function")
        );

        let call = RuntimeCall::new("Assets", "transfer", json!({}));
        assert!(coder().validate_call(&call).is_err());
    }

    #[test]
    fn test_validate_nested_calls() {
        let bad = RuntimeCall::new("Democracy", "vote", json!({}));
        let batch = RuntimeCall::new("Utility", "batch", json!({ "calls": [bad] }));
        assert!(coder().validate_call(&batch).is_err());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let call = RuntimeCall::transfer(&AccountId::new(vec![2u8; 32]), 5);
        assert_eq!(coder().encode_call(&call).unwrap(), coder().encode_call(&call).unwrap());
    }
}
