//! Transaction service capability
//!
//! Consumer-facing surface: fee estimation, submission and single
//! transaction building over either chain family. Every call returns a
//! compound operation the caller submits to its own [`OperationQueue`];
//! [`estimate_fee`] and [`submit`] do the submission and callback plumbing.

pub mod evm;
pub mod fee_id;
pub mod fee_proxy;
pub mod history;
pub mod substrate;

pub use evm::EvmTransactionService;
pub use fee_id::{SwapDirection, SwapFeeArgs, TransactionFeeId, TransferFeeArgs};
pub use fee_proxy::{FeeProxyDelegate, TransactionFeeProxy};
pub use history::{InMemoryHistoryStore, SubmittedTransactionRecord, TransactionHistoryStore};
pub use substrate::SubstrateTransactionService;

use crate::operation::{execute, CallbackQueue, CompoundOperation, OperationError, OperationQueue, OperationResult};
use crate::rpc_manager::RpcEngine;
use crate::runtime::{RpcRuntimeProvider, RuntimeCodingService, RuntimeMetadata};
use crate::signer::SigningWrapper;
use crate::tx_builder::{
    CurrentAccountResolutionFactory, EraOperationFactory, EvmTransactionBuilderIndexedClosure,
    EvmTransactionOperationFactory, ExtrinsicBuilderIndexedClosure, ExtrinsicOperationFactory, IndexedResults,
    MortalEraOperationFactory, SenderResolutionFactory, TransactionBuilderError,
};
use crate::types::{AccountId, Balance, ChainAccount, ChainFamily, ChainModel, CryptoType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What to build, per chain family
#[derive(Clone)]
pub enum TransactionRequest {
    Extrinsic(ExtrinsicBuilderIndexedClosure),
    Evm(EvmTransactionBuilderIndexedClosure),
}

impl TransactionRequest {
    pub fn family_name(&self) -> &'static str {
        match self {
            TransactionRequest::Extrinsic(_) => "substrate",
            TransactionRequest::Evm(_) => "evm",
        }
    }
}

impl std::fmt::Debug for TransactionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransactionRequest::{}", self.family_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeeDetails {
    Substrate { weight: u64 },
    Evm { gas_limit: u64, gas_price: u128 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFee {
    pub amount: Balance,
    /// Account paying the fee when it is not the nominal sender (proxy delegate)
    pub payer: Option<AccountId>,
    pub details: FeeDetails,
}

pub type FeeIndexedResult = IndexedResults<TransactionFee>;

/// Transaction hashes returned by the node, per index
pub type SubmitIndexedResult = IndexedResults<String>;

pub trait TransactionService: Send + Sync {
    fn chain(&self) -> &ChainModel;

    fn estimate_fee_operation(
        &self,
        request: TransactionRequest,
        indexes: Vec<usize>,
    ) -> CompoundOperation<FeeIndexedResult>;

    fn submit_operation(
        &self,
        request: TransactionRequest,
        signer: Arc<dyn SigningWrapper>,
        indexes: Vec<usize>,
    ) -> CompoundOperation<SubmitIndexedResult>;

    /// Sign a single transaction without submitting it; yields its hex encoding
    fn build_operation(
        &self,
        request: TransactionRequest,
        signer: Arc<dyn SigningWrapper>,
    ) -> CompoundOperation<String>;

    fn estimate_fee_single_operation(&self, request: TransactionRequest) -> CompoundOperation<TransactionFee> {
        self.estimate_fee_operation(request, vec![0])
            .map("extract_fee", first_result)
    }

    fn submit_single_operation(
        &self,
        request: TransactionRequest,
        signer: Arc<dyn SigningWrapper>,
    ) -> CompoundOperation<String> {
        self.submit_operation(request, signer, vec![0])
            .map("extract_tx_hash", first_result)
    }
}

/// First indexed result of a batch, or `UnexpectedDependentResult` when empty
pub fn first_result<T>(results: IndexedResults<T>) -> OperationResult<T> {
    let first = results
        .into_iter()
        .next()
        .ok_or(OperationError::UnexpectedDependentResult)?;
    Ok(first.result?)
}

pub(crate) fn unsupported<T>(service: &str, request: &TransactionRequest) -> CompoundOperation<T>
where
    T: Clone + Send + Sync + 'static,
{
    CompoundOperation::from_result(
        "unsupported_request",
        Err(TransactionBuilderError::UnsupportedRequest(format!(
            "{} service cannot build {} transactions",
            service,
            request.family_name()
        ))
        .into()),
    )
}

/// Estimate fees for `indexes` and deliver the result on `callback_queue`
pub fn estimate_fee<F>(
    service: &dyn TransactionService,
    request: TransactionRequest,
    indexes: Vec<usize>,
    queue: &OperationQueue,
    callback_queue: &CallbackQueue,
    callback: F,
) where
    F: FnOnce(OperationResult<FeeIndexedResult>) + Send + 'static,
{
    let wrapper = service.estimate_fee_operation(request, indexes);
    execute(&wrapper, queue, callback_queue, callback);
}

/// Sign and submit `indexes` and deliver the hashes on `callback_queue`
pub fn submit<F>(
    service: &dyn TransactionService,
    request: TransactionRequest,
    signer: Arc<dyn SigningWrapper>,
    indexes: Vec<usize>,
    queue: &OperationQueue,
    callback_queue: &CallbackQueue,
    callback: F,
) where
    F: FnOnce(OperationResult<SubmitIndexedResult>) + Send + 'static,
{
    let wrapper = service.submit_operation(request, signer, indexes);
    execute(&wrapper, queue, callback_queue, callback);
}

/// Collaborators a service is built from
#[derive(Clone)]
pub struct ServiceDependencies {
    pub engine: Arc<dyn RpcEngine>,
    pub account: ChainAccount,
    pub runtime: Arc<dyn RuntimeCodingService>,
    pub era_factory: Arc<dyn EraOperationFactory>,
    pub sender_factory: Arc<dyn SenderResolutionFactory>,
    pub history: Arc<dyn TransactionHistoryStore>,
}

impl ServiceDependencies {
    /// Defaults: runtime version over RPC, mortal era of 64 blocks, the
    /// account signs for itself, in-memory history
    pub fn new(engine: Arc<dyn RpcEngine>, account: ChainAccount) -> Self {
        Self {
            runtime: Arc::new(RpcRuntimeProvider::new(engine.clone(), RuntimeMetadata::standard())),
            era_factory: Arc::new(MortalEraOperationFactory::default()),
            sender_factory: Arc::new(CurrentAccountResolutionFactory::new(account.clone())),
            history: Arc::new(InMemoryHistoryStore::new()),
            engine,
            account,
        }
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn RuntimeCodingService>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_era_factory(mut self, era_factory: Arc<dyn EraOperationFactory>) -> Self {
        self.era_factory = era_factory;
        self
    }

    pub fn with_sender_factory(mut self, sender_factory: Arc<dyn SenderResolutionFactory>) -> Self {
        self.sender_factory = sender_factory;
        self
    }

    pub fn with_history(mut self, history: Arc<dyn TransactionHistoryStore>) -> Self {
        self.history = history;
        self
    }
}

/// Pick the service implementation for the chain family
pub fn create_transaction_service(
    chain: ChainModel,
    deps: ServiceDependencies,
) -> Result<Arc<dyn TransactionService>, TransactionBuilderError> {
    match chain.family {
        ChainFamily::Substrate => {
            let factory = ExtrinsicOperationFactory::new(
                chain.clone(),
                deps.engine,
                deps.runtime,
                deps.era_factory,
                deps.sender_factory,
            );
            Ok(Arc::new(SubstrateTransactionService::new(chain, factory, deps.history)))
        }
        ChainFamily::Evm { chain_id } => {
            if deps.account.crypto_type != CryptoType::Ethereum {
                return Err(TransactionBuilderError::Configuration(format!(
                    "EVM chain {} requires an Ethereum account, got {:?}",
                    chain.chain_id, deps.account.crypto_type
                )));
            }
            let factory = EvmTransactionOperationFactory::new(chain_id, deps.account.account_id, deps.engine);
            Ok(Arc::new(EvmTransactionService::new(chain, factory, deps.history)))
        }
    }
}
