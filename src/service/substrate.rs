//! Substrate transaction service

use super::history::{SubmittedTransactionRecord, TransactionHistoryStore};
use super::{
    unsupported, FeeDetails, FeeIndexedResult, SubmitIndexedResult, TransactionFee, TransactionRequest,
    TransactionService,
};
use crate::metrics::metrics;
use crate::operation::{CompoundOperation, Operation};
use crate::rpc_manager::{call_typed, methods, parse_quantity, RpcEngine, RpcManagerError};
use crate::signer::{DummySigningWrapper, SigningWrapper};
use crate::tx_builder::{ExtrinsicOperationFactory, SignedExtrinsic, TransactionBuilderError};
use crate::types::{Balance, ChainModel, IndexedResult};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

const QUERY_INFO_RUNTIME_API: &str = "TransactionPaymentApi_query_info";

/// Dispatch info as returned by the runtime API
#[derive(Debug, Deserialize)]
struct RuntimeDispatchInfo {
    weight: u64,
    #[allow(dead_code)]
    class: u8,
    partial_fee: Balance,
}

pub struct SubstrateTransactionService {
    chain: ChainModel,
    factory: ExtrinsicOperationFactory,
    history: Arc<dyn TransactionHistoryStore>,
}

impl SubstrateTransactionService {
    pub fn new(chain: ChainModel, factory: ExtrinsicOperationFactory, history: Arc<dyn TransactionHistoryStore>) -> Self {
        Self {
            chain,
            factory,
            history,
        }
    }

    pub fn factory(&self) -> &ExtrinsicOperationFactory {
        &self.factory
    }
}

impl TransactionService for SubstrateTransactionService {
    fn chain(&self) -> &ChainModel {
        &self.chain
    }

    fn estimate_fee_operation(
        &self,
        request: TransactionRequest,
        indexes: Vec<usize>,
    ) -> CompoundOperation<FeeIndexedResult> {
        let TransactionRequest::Extrinsic(closure) = request else {
            return unsupported("substrate", &request);
        };

        let build = self
            .factory
            .create_extrinsics_operation(closure, indexes, Arc::new(DummySigningWrapper));

        let engine = self.factory.engine().clone();
        let via_runtime_call = self.chain.fee_via_runtime_call;
        let built = build.target().clone();

        let fee_op = Operation::new("query_fees", move || async move {
            let created = built.extract_no_cancellable_result_data()?;
            let payer = created
                .sender
                .delegation
                .as_ref()
                .map(|_| created.sender.account.account_id.clone());

            let queries = created.extrinsics.into_iter().map(|item| {
                let engine = engine.clone();
                let payer = payer.clone();
                async move {
                    let result = match item.result {
                        Ok(extrinsic) => query_fee(engine.as_ref(), &extrinsic, via_runtime_call)
                            .await
                            .map(|(amount, weight)| TransactionFee {
                                amount,
                                payer,
                                details: FeeDetails::Substrate { weight },
                            }),
                        Err(err) => Err(err),
                    };
                    IndexedResult::new(item.index, result)
                }
            });

            let fees: FeeIndexedResult = futures::future::join_all(queries).await;
            Ok(fees)
        });
        fee_op.add_dependency(build.target());

        CompoundOperation::new(fee_op, build.all_operations())
    }

    fn submit_operation(
        &self,
        request: TransactionRequest,
        signer: Arc<dyn SigningWrapper>,
        indexes: Vec<usize>,
    ) -> CompoundOperation<SubmitIndexedResult> {
        let TransactionRequest::Extrinsic(closure) = request else {
            return unsupported("substrate", &request);
        };

        let build = self.factory.create_extrinsics_operation(closure, indexes, signer);

        let engine = self.factory.engine().clone();
        let history = self.history.clone();
        let chain_id = self.chain.chain_id.clone();
        let built = build.target().clone();

        let submit_op = Operation::new("submit_extrinsics", move || async move {
            let created = built.extract_no_cancellable_result_data()?;
            let sender = created.sender;
            let mut results = Vec::with_capacity(created.extrinsics.len());

            // Nonces are consecutive, so submission keeps index order
            for item in created.extrinsics {
                let result = match item.result {
                    Ok(extrinsic) => submit_extrinsic(engine.as_ref(), &extrinsic).await.map(|tx_hash| {
                        metrics().transactions_submitted.inc();
                        info!(index = item.index, tx_hash = %tx_hash, nonce = extrinsic.nonce, "Extrinsic submitted");
                        history.persist(SubmittedTransactionRecord {
                            chain_id: chain_id.clone(),
                            tx_hash: tx_hash.clone(),
                            sender: sender.account.account_id.clone(),
                            on_behalf_of: sender.delegation.as_ref().map(|d| d.proxied.clone()),
                            nonce: u64::from(extrinsic.nonce),
                            encoded: extrinsic.to_hex(),
                            submitted_at: Utc::now(),
                        });
                        tx_hash
                    }),
                    Err(err) => Err(err),
                };

                if let Err(err) = &result {
                    warn!(index = item.index, error = %err, "Extrinsic not submitted");
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
        let TransactionRequest::Extrinsic(closure) = request else {
            return unsupported("substrate", &request);
        };

        self.factory
            .create_extrinsic_operation(closure, signer)
            .map("extrinsic_hex", |extrinsic| Ok(extrinsic.to_hex()))
    }
}

async fn query_fee(
    engine: &dyn RpcEngine,
    extrinsic: &SignedExtrinsic,
    via_runtime_call: bool,
) -> Result<(Balance, u64), TransactionBuilderError> {
    if via_runtime_call {
        let mut data = extrinsic.data.clone();
        let len = u32::try_from(extrinsic.data.len())
            .map_err(|_| TransactionBuilderError::encoding("extrinsic too large"))?;
        data.extend_from_slice(&len.to_le_bytes());

        let encoded: String = call_typed(
            engine,
            methods::STATE_CALL,
            json!([QUERY_INFO_RUNTIME_API, format!("0x{}", hex::encode(&data))]),
        )
        .await?;
        let bytes = hex::decode(encoded.trim_start_matches("0x"))
            .map_err(|err| RpcManagerError::decode(methods::STATE_CALL, err))?;
        let info: RuntimeDispatchInfo =
            bincode::deserialize(&bytes).map_err(|err| RpcManagerError::decode(methods::STATE_CALL, err))?;
        return Ok((info.partial_fee, info.weight));
    }

    let info: Value = call_typed(engine, methods::PAYMENT_QUERY_INFO, json!([extrinsic.to_hex()])).await?;
    let fee = info
        .get("partialFee")
        .ok_or_else(|| RpcManagerError::decode(methods::PAYMENT_QUERY_INFO, "missing partialFee"))?;
    let amount = parse_quantity(methods::PAYMENT_QUERY_INFO, fee)?;
    Ok((amount, parse_weight(info.get("weight"))))
}

/// Weight is a plain number on older runtimes and `{refTime, proofSize}` on newer ones
fn parse_weight(weight: Option<&Value>) -> u64 {
    let weight = match weight {
        Some(Value::Object(fields)) => fields.get("refTime").or_else(|| fields.get("ref_time")),
        other => other,
    };
    weight
        .and_then(|value| parse_quantity(methods::PAYMENT_QUERY_INFO, value).ok())
        .and_then(|value| u64::try_from(value).ok())
        .unwrap_or_default()
}

async fn submit_extrinsic(engine: &dyn RpcEngine, extrinsic: &SignedExtrinsic) -> Result<String, TransactionBuilderError> {
    let hash: String = call_typed(engine, methods::AUTHOR_SUBMIT_EXTRINSIC, json!([extrinsic.to_hex()])).await?;
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_weight_forms() {
        assert_eq!(parse_weight(Some(&json!(1000))), 1000);
        assert_eq!(parse_weight(Some(&json!({ "refTime": 77, "proofSize": 3 }))), 77);
        assert_eq!(parse_weight(Some(&json!({ "ref_time": "0x10" }))), 16);
        assert_eq!(parse_weight(None), 0);
    }
}
