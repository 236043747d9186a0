//! Transaction Builder
//!
//! Construction side of the pipeline, built out of operations:
//!
//! - **errors**: error taxonomy shared by every construction step
//! - **era**: lifetime window resolution (immortal or mortal)
//! - **sender**: who signs, directly or through a proxy
//! - **context**: what the signer is told about the transaction
//! - **builder**: the Substrate extrinsic value builder
//! - **factory**: the batch pipeline producing signed extrinsics
//! - **evm**: the EVM builder and its batch pipeline
//! - **output**: indexed batch results
//!
//! ## Batch semantics
//!
//! A batch shares its chain parameters (coder, genesis, era) and performs a
//! single nonce fetch after sender resolution. Position `i` of the requested
//! indexes is assigned nonce `n + i`. Failures up to and including nonce
//! resolution fail the whole batch; signing and encoding failures are
//! reported per index.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use txflow::tx_builder::{ExtrinsicBuilderIndexedClosure, ExtrinsicOperationFactory};
//! use txflow::types::{AccountId, RuntimeCall};
//!
//! # fn example(factory: &ExtrinsicOperationFactory, signer: Arc<dyn txflow::signer::SigningWrapper>) {
//! let dest = AccountId::new(vec![1; 32]);
//! let closure: ExtrinsicBuilderIndexedClosure = Arc::new(move |builder, index| {
//!     Ok(builder.adding_call(RuntimeCall::transfer(&dest, 1_000 + index as u128)))
//! });
//! let wrapper = factory.create_extrinsics_operation(closure, vec![0, 1, 2], signer);
//! # let _ = wrapper;
//! # }
//! ```

pub mod errors;
pub use errors::TransactionBuilderError;

pub mod builder;
pub mod context;
pub mod era;
pub mod evm;
pub mod factory;
pub mod output;
pub mod sender;

pub use builder::{BatchType, ExtrinsicBuilder, SignedExtension, MAX_UNHASHED_PAYLOAD_LEN};
pub use context::SigningContext;
pub use era::{Era, EraOperationFactory, EraResolution, ImmortalEraOperationFactory, MortalEraOperationFactory};
pub use evm::{
    EvmTransactionBuilder, EvmTransactionBuilderIndexedClosure, EvmTransactionOperationFactory,
    EvmTransactionsCreationResult, SignedEvmTransaction,
};
pub use factory::{block_hash_operation, sign_batch, ExtrinsicBuilderIndexedClosure, ExtrinsicOperationFactory, ResolvedBuilders};
pub use output::{ExtrinsicsCreationResult, IndexedResults, SignedExtrinsic};
pub use sender::{
    CurrentAccountResolutionFactory, DelegatedAccount, ExtrinsicSenderResolution, ProxyDefinition,
    ProxyResolutionFactory, ProxyType, SenderResolutionFactory, SenderResolver,
};
