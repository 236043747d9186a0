//! RPC Manager Module
//!
//! Connection abstraction used by the pipeline: a JSON-RPC [`RpcEngine`],
//! the HTTP implementation and helpers turning RPC calls into operations.

use crate::metrics::{metrics, Timer};
use crate::operation::{Operation, OperationResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

// Submodules
pub mod rpc_engine;
pub mod rpc_errors;

// Re-exports for convenience
pub use rpc_engine::HttpRpcEngine;
pub use rpc_errors::{RpcManagerError, RpcResult};

/// JSON-RPC method names used by the pipeline
pub mod methods {
    pub const CHAIN_GET_BLOCK_HASH: &str = "chain_getBlockHash";
    pub const CHAIN_GET_FINALIZED_HEAD: &str = "chain_getFinalizedHead";
    pub const CHAIN_GET_HEADER: &str = "chain_getHeader";
    pub const STATE_GET_RUNTIME_VERSION: &str = "state_getRuntimeVersion";
    pub const STATE_CALL: &str = "state_call";
    pub const SYSTEM_ACCOUNT_NEXT_INDEX: &str = "system_accountNextIndex";
    pub const PAYMENT_QUERY_INFO: &str = "payment_queryInfo";
    pub const AUTHOR_SUBMIT_EXTRINSIC: &str = "author_submitExtrinsic";

    pub const ETH_GET_TRANSACTION_COUNT: &str = "eth_getTransactionCount";
    pub const ETH_ESTIMATE_GAS: &str = "eth_estimateGas";
    pub const ETH_GAS_PRICE: &str = "eth_gasPrice";
    pub const ETH_SEND_RAW_TRANSACTION: &str = "eth_sendRawTransaction";
}

/// A connection able to answer JSON-RPC calls
#[async_trait]
pub trait RpcEngine: Send + Sync + std::fmt::Debug {
    /// Endpoint label used in logs and errors
    fn endpoint(&self) -> &str;

    async fn call(&self, method: &str, params: Value) -> RpcResult<Value>;
}

/// Call `method` and decode the result into `R`
pub async fn call_typed<R>(engine: &dyn RpcEngine, method: &str, params: Value) -> RpcResult<R>
where
    R: DeserializeOwned,
{
    let timer = Timer::new();
    let value = engine.call(method, params).await;
    timer.observe_duration(&metrics().rpc_latency);

    serde_json::from_value(value?).map_err(|err| RpcManagerError::decode(method, err))
}

/// Operation issuing one RPC call.
///
/// `params` runs when the operation starts, so it may read the results of
/// the operation's dependencies.
pub fn rpc_operation<R, F>(engine: Arc<dyn RpcEngine>, method: &'static str, params: F) -> Operation<R>
where
    R: DeserializeOwned + Clone + Send + Sync + 'static,
    F: FnOnce() -> OperationResult<Value> + Send + 'static,
{
    Operation::new(method, move || async move {
        let params = params()?;
        let value = call_typed::<R>(engine.as_ref(), method, params).await?;
        Ok(value)
    })
}

/// Parse a JSON-RPC quantity (`"0x1a"`) or a plain number
pub fn parse_quantity(method: &str, value: &Value) -> RpcResult<u128> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| RpcManagerError::decode(method, "negative or fractional number")),
        Value::String(s) => {
            let parsed = match s.strip_prefix("0x") {
                Some(hex) => u128::from_str_radix(hex, 16),
                None => s.parse::<u128>(),
            };
            parsed.map_err(|err| RpcManagerError::decode(method, err))
        }
        other => Err(RpcManagerError::decode(
            method,
            format!("expected quantity, got {}", other),
        )),
    }
}

/// Encode a JSON-RPC quantity
pub fn to_quantity(value: u128) -> String {
    format!("0x{:x}", value)
}
