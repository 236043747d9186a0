//! txflow - operation-graph engine and transaction pipeline
//!
//! Builds, signs, prices and submits batches of transactions for
//! Substrate-style and EVM chains. Every network step is an [`operation::Operation`]
//! in a dependency graph executed by a bounded [`operation::OperationQueue`].
//!
//! ## Layout
//!
//! - [`operation`]: operations, compound graphs, the worker queue and the
//!   cancellable call tracker
//! - [`tx_builder`]: extrinsic builder, era/sender/nonce resolution and the
//!   batch construction pipeline
//! - [`service`]: fee estimation, submission and the fee proxy cache
//! - [`rpc_manager`]: JSON-RPC engine over HTTP
//! - [`runtime`]: runtime versions and call encoding

pub mod config;
pub mod metrics;
pub mod observability;
pub mod operation;
pub mod rpc_manager;
pub mod runtime;
pub mod service;
pub mod signer;
pub mod structured_logging;
pub mod tx_builder;
pub mod types;

pub mod test_utils;

pub use operation::{CompoundOperation, Operation, OperationError, OperationQueue, OperationResult};
pub use service::{create_transaction_service, TransactionFeeProxy, TransactionRequest, TransactionService};
pub use tx_builder::{ExtrinsicBuilder, ExtrinsicOperationFactory, TransactionBuilderError};

#[cfg(test)]
mod tests {
    mod call_store_tests;
    mod engine_scenarios;
    mod fee_proxy_tests;
    mod nonce_property_tests;
    mod pipeline_tests;
    mod service_tests;
}
