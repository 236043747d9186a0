//! Test Utilities Module
//!
//! This module provides test-only utilities for mocking the RPC connection,
//! signing, and the chain fixtures needed for deterministic pipeline tests.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use crate::rpc_manager::{methods, RpcEngine, RpcManagerError, RpcResult};
use crate::runtime::{CoderFactory, RuntimeMetadata, StaticRuntimeProvider};
use crate::service::{create_transaction_service, InMemoryHistoryStore, ServiceDependencies, TransactionService};
use crate::signer::SigningWrapper;
use crate::tx_builder::{
    EraOperationFactory, EvmTransactionBuilderIndexedClosure, ExtrinsicBuilderIndexedClosure,
    ExtrinsicOperationFactory, CurrentAccountResolutionFactory, ImmortalEraOperationFactory, SigningContext,
    TransactionBuilderError,
};
use crate::types::{AccountId, BlockHash, ChainAccount, ChainModel, CryptoType, RuntimeCall};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Handler = Arc<dyn Fn(&Value) -> RpcResult<Value> + Send + Sync>;

/// Scripted JSON-RPC connection
///
/// Every method must be scripted; unscripted calls fail with a JSON-RPC
/// "method not found" error. One-shot responses take precedence over the
/// method's standing handler.
#[derive(Default)]
pub struct MockRpcEngine {
    /// Standing handler per method
    handlers: DashMap<String, Handler>,

    /// Responses consumed before the standing handler, in order
    once: DashMap<String, VecDeque<RpcResult<Value>>>,

    /// Artificial latency per method
    delays: DashMap<String, Duration>,

    /// Number of calls per method
    calls: DashMap<String, usize>,

    /// Every call in arrival order
    log: Mutex<Vec<(String, Value)>>,
}

impl std::fmt::Debug for MockRpcEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRpcEngine")
            .field("scripted", &self.handlers.len())
            .field("calls", &self.total_calls())
            .finish()
    }
}

impl MockRpcEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `method` with `value`
    pub fn respond(&self, method: &str, value: Value) -> &Self {
        self.respond_with(method, move |_| Ok(value.clone()))
    }

    /// Answer `method` by computing the result from its params
    pub fn respond_with<F>(&self, method: &str, handler: F) -> &Self
    where
        F: Fn(&Value) -> RpcResult<Value> + Send + Sync + 'static,
    {
        self.handlers.insert(method.to_string(), Arc::new(handler));
        self
    }

    /// Answer the next call of `method` with `result`
    pub fn respond_once(&self, method: &str, result: RpcResult<Value>) -> &Self {
        self.once.entry(method.to_string()).or_default().push_back(result);
        self
    }

    /// Always fail `method` with a JSON-RPC error
    pub fn fail(&self, method: &str, code: i64, message: &str) -> &Self {
        let method_name = method.to_string();
        let message = message.to_string();
        self.respond_with(method, move |_| {
            Err(RpcManagerError::RpcResponse {
                method: method_name.clone(),
                message: message.clone(),
                code,
            })
        })
    }

    pub fn delay(&self, method: &str, delay: Duration) -> &Self {
        self.delays.insert(method.to_string(), delay);
        self
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls.get(method).map(|count| *count).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|entry| *entry.value()).sum()
    }

    /// Params of every call of `method`, in order
    pub fn params_of(&self, method: &str) -> Vec<Value> {
        self.log
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    /// Method names in call order
    pub fn call_order(&self) -> Vec<String> {
        self.log.lock().iter().map(|(method, _)| method.clone()).collect()
    }
}

#[async_trait]
impl RpcEngine for MockRpcEngine {
    fn endpoint(&self) -> &str {
        "mock://rpc"
    }

    async fn call(&self, method: &str, params: Value) -> RpcResult<Value> {
        *self.calls.entry(method.to_string()).or_insert(0) += 1;
        self.log.lock().push((method.to_string(), params.clone()));

        let delay = self.delays.get(method).map(|delay| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self.once.get_mut(method).and_then(|mut queue| queue.pop_front());
        if let Some(result) = queued {
            return result;
        }

        let handler = self.handlers.get(method).map(|handler| handler.clone());
        match handler {
            Some(handler) => handler(&params),
            None => Err(RpcManagerError::RpcResponse {
                method: method.to_string(),
                message: "Method not found".to_string(),
                code: -32601,
            }),
        }
    }
}

/// Deterministic signer producing a fixed-size signature
#[derive(Debug, Default)]
pub struct MockSigner {
    /// Number of signatures produced
    pub signed: AtomicUsize,
}

impl MockSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_count(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }
}

impl SigningWrapper for MockSigner {
    fn sign(&self, _payload: &[u8], context: &SigningContext) -> Result<Vec<u8>, TransactionBuilderError> {
        self.signed.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0x42; context.crypto_type().signature_len()])
    }
}

/// Signer failing selected invocations (0-based, in signing order)
#[derive(Debug)]
pub struct FailingSigner {
    /// `None` fails every invocation
    failing: Option<HashSet<usize>>,
    invocations: AtomicUsize,
}

impl FailingSigner {
    pub fn failing_at(invocations: impl IntoIterator<Item = usize>) -> Self {
        Self {
            failing: Some(invocations.into_iter().collect()),
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn always() -> Self {
        Self {
            failing: None,
            invocations: AtomicUsize::new(0),
        }
    }
}

impl SigningWrapper for FailingSigner {
    fn sign(&self, _payload: &[u8], context: &SigningContext) -> Result<Vec<u8>, TransactionBuilderError> {
        let invocation = self.invocations.fetch_add(1, Ordering::SeqCst);
        let fails = self
            .failing
            .as_ref()
            .map_or(true, |failing| failing.contains(&invocation));
        if fails {
            return Err(TransactionBuilderError::signing(format!(
                "signer rejected invocation {}",
                invocation
            )));
        }
        Ok(vec![0x24; context.crypto_type().signature_len()])
    }
}

pub const GENESIS_BYTE: u8 = 0x99;

pub fn genesis_hash() -> BlockHash {
    BlockHash([GENESIS_BYTE; 32])
}

pub fn test_account() -> ChainAccount {
    ChainAccount::new(AccountId::new(vec![0x11; 32]), CryptoType::Sr25519)
}

pub fn evm_account() -> ChainAccount {
    ChainAccount::new(AccountId::new(vec![0xee; 20]), CryptoType::Ethereum)
}

pub fn recipient() -> AccountId {
    AccountId::new(vec![0x22; 32])
}

pub fn test_chain() -> ChainModel {
    ChainModel::substrate("local", "Local Testnet")
}

pub fn test_coder() -> CoderFactory {
    CoderFactory::new(100, 1, RuntimeMetadata::standard())
}

pub fn static_runtime() -> Arc<StaticRuntimeProvider> {
    Arc::new(StaticRuntimeProvider::new(test_coder()))
}

/// Engine answering every Substrate method the pipeline uses
///
/// Block hashes are derived from the block number (`[number as u8; 32]`,
/// genesis is [`genesis_hash`]). Submission hashes count up from 1.
pub fn scripted_substrate_engine(nonce: u64) -> Arc<MockRpcEngine> {
    let engine = Arc::new(MockRpcEngine::new());
    engine
        .respond_with(methods::CHAIN_GET_BLOCK_HASH, |params| {
            let number = params[0].as_u64().unwrap_or(0);
            let hash = if number == 0 {
                genesis_hash()
            } else {
                BlockHash([number as u8; 32])
            };
            Ok(json!(hash.to_hex()))
        })
        .respond(methods::CHAIN_GET_FINALIZED_HEAD, json!(format!("0x{}", "ab".repeat(32))))
        .respond(methods::CHAIN_GET_HEADER, json!({ "number": "0x3f2" }))
        .respond(methods::SYSTEM_ACCOUNT_NEXT_INDEX, json!(nonce))
        .respond(
            methods::PAYMENT_QUERY_INFO,
            json!({ "weight": { "refTime": 1500, "proofSize": 10 }, "class": "normal", "partialFee": "1000" }),
        );

    let submitted = AtomicUsize::new(0);
    engine.respond_with(methods::AUTHOR_SUBMIT_EXTRINSIC, move |_| {
        let n = submitted.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!(format!("0x{:064x}", n)))
    });
    engine
}

/// Engine answering every EVM method the pipeline uses
pub fn scripted_evm_engine(nonce: u64) -> Arc<MockRpcEngine> {
    let engine = Arc::new(MockRpcEngine::new());
    engine
        .respond(methods::ETH_GET_TRANSACTION_COUNT, json!(format!("0x{:x}", nonce)))
        .respond(methods::ETH_GAS_PRICE, json!("0x3b9aca00"))
        .respond(methods::ETH_ESTIMATE_GAS, json!("0x5208"));

    let submitted = AtomicUsize::new(0);
    engine.respond_with(methods::ETH_SEND_RAW_TRANSACTION, move |_| {
        let n = submitted.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!(format!("0x{:064x}", n)))
    });
    engine
}

/// Balance transfer of `1_000 + index` to [`recipient`]
pub fn transfer_closure() -> ExtrinsicBuilderIndexedClosure {
    Arc::new(|builder, index| Ok(builder.adding_call(RuntimeCall::transfer(&recipient(), 1_000 + index as u128))))
}

/// Value transfer of `index + 1` wei
pub fn evm_transfer_closure() -> EvmTransactionBuilderIndexedClosure {
    Arc::new(|builder, index| {
        Ok(builder
            .with_to(AccountId::new(vec![0x01; 20]))
            .with_value(index as u128 + 1))
    })
}

pub fn substrate_factory(engine: Arc<MockRpcEngine>, era_factory: Arc<dyn EraOperationFactory>) -> ExtrinsicOperationFactory {
    ExtrinsicOperationFactory::new(
        test_chain(),
        engine,
        static_runtime(),
        era_factory,
        Arc::new(CurrentAccountResolutionFactory::new(test_account())),
    )
}

/// Substrate service over `engine` with an immortal era and a static runtime
pub fn substrate_service(
    engine: Arc<MockRpcEngine>,
    history: Arc<InMemoryHistoryStore>,
) -> Arc<dyn TransactionService> {
    let deps = ServiceDependencies::new(engine, test_account())
        .with_runtime(static_runtime())
        .with_era_factory(Arc::new(ImmortalEraOperationFactory))
        .with_history(history);

    // Substrate services are always constructible
    match create_transaction_service(test_chain(), deps) {
        Ok(service) => service,
        Err(err) => panic!("substrate service: {}", err),
    }
}

pub fn evm_service(engine: Arc<MockRpcEngine>, history: Arc<InMemoryHistoryStore>) -> Arc<dyn TransactionService> {
    let deps = ServiceDependencies::new(engine, evm_account()).with_history(history);
    match create_transaction_service(ChainModel::evm("eth", "Ethereum", 1), deps) {
        Ok(service) => service,
        Err(err) => panic!("evm service: {}", err),
    }
}
