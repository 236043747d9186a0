//! EVM transaction service

use super::history::{SubmittedTransactionRecord, TransactionHistoryStore};
use super::{
    unsupported, FeeDetails, FeeIndexedResult, SubmitIndexedResult, TransactionFee, TransactionRequest,
    TransactionService,
};
use crate::metrics::metrics;
use crate::operation::{CompoundOperation, Operation, OperationError};
use crate::rpc_manager::{call_typed, methods};
use crate::signer::{DummySigningWrapper, SigningWrapper};
use crate::tx_builder::{EvmTransactionOperationFactory, TransactionBuilderError};
use crate::types::{ChainModel, IndexedResult};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

pub struct EvmTransactionService {
    chain: ChainModel,
    factory: EvmTransactionOperationFactory,
    history: Arc<dyn TransactionHistoryStore>,
}

impl EvmTransactionService {
    pub fn new(
        chain: ChainModel,
        factory: EvmTransactionOperationFactory,
        history: Arc<dyn TransactionHistoryStore>,
    ) -> Self {
        Self {
            chain,
            factory,
            history,
        }
    }
}

impl TransactionService for EvmTransactionService {
    fn chain(&self) -> &ChainModel {
        &self.chain
    }

    fn estimate_fee_operation(
        &self,
        request: TransactionRequest,
        indexes: Vec<usize>,
    ) -> CompoundOperation<FeeIndexedResult> {
        let TransactionRequest::Evm(closure) = request else {
            return unsupported("evm", &request);
        };

        self.factory
            .create_transactions_operation(closure, indexes, Arc::new(DummySigningWrapper))
            .map("evm_fees", |created| {
                Ok(created
                    .transactions
                    .into_iter()
                    .map(|item| {
                        let result = item.result.map(|tx| TransactionFee {
                            amount: tx.fee(),
                            payer: None,
                            details: FeeDetails::Evm {
                                gas_limit: tx.gas_limit,
                                gas_price: tx.gas_price,
                            },
                        });
                        IndexedResult::new(item.index, result)
                    })
                    .collect())
            })
    }

    fn submit_operation(
        &self,
        request: TransactionRequest,
        signer: Arc<dyn SigningWrapper>,
        indexes: Vec<usize>,
    ) -> CompoundOperation<SubmitIndexedResult> {
        let TransactionRequest::Evm(closure) = request else {
            return unsupported("evm", &request);
        };

        let build = self.factory.create_transactions_operation(closure, indexes, signer);
        let engine = self.factory.engine().clone();
        let history = self.history.clone();
        let chain_id = self.chain.chain_id.clone();
        let built = build.target().clone();

        let submit_op = Operation::new("submit_evm_transactions", move || async move {
            let created = built.extract_no_cancellable_result_data()?;
            let mut results = Vec::with_capacity(created.transactions.len());

            for item in created.transactions {
                let result = match item.result {
                    Ok(tx) => {
                        let submitted: Result<String, TransactionBuilderError> =
                            call_typed(engine.as_ref(), methods::ETH_SEND_RAW_TRANSACTION, json!([tx.to_hex()]))
                                .await
                                .map_err(TransactionBuilderError::from);
                        match submitted {
                            Ok(tx_hash) => {
                                metrics().transactions_submitted.inc();
                                info!(index = item.index, tx_hash = %tx_hash, nonce = tx.nonce, "EVM transaction submitted");
                                history.persist(SubmittedTransactionRecord {
                                    chain_id: chain_id.clone(),
                                    tx_hash: tx_hash.clone(),
                                    sender: created.sender.clone(),
                                    on_behalf_of: None,
                                    nonce: tx.nonce,
                                    encoded: tx.to_hex(),
                                    submitted_at: Utc::now(),
                                });
                                Ok(tx_hash)
                            }
                            Err(err) => Err(err),
                        }
                    }
                    Err(err) => Err(err),
                };

                if let Err(err) = &result {
                    warn!(index = item.index, error = %err, "EVM transaction not submitted");
                }
                results.push(IndexedResult::new(item.index, result));
            }

            Ok(results)
        });
        submit_op.add_dependency(build.target());

        CompoundOperation::new(submit_op, build.all_operations())
    }

    fn build_operation(
        &self,
        request: TransactionRequest,
        signer: Arc<dyn SigningWrapper>,
    ) -> CompoundOperation<String> {
        let TransactionRequest::Evm(closure) = request else {
            return unsupported("evm", &request);
        };

        self.factory
            .create_transactions_operation(closure, vec![0], signer)
            .map("evm_transaction_hex", |created| {
                let first = created
                    .transactions
                    .into_iter()
                    .next()
                    .ok_or(OperationError::UnexpectedDependentResult)?;
                Ok(first.result?.to_hex())
            })
    }
}
