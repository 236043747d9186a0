//! EVM-family transactions
//!
//! Same pipeline shape as the Substrate path with the EVM fee model: one
//! `eth_getTransactionCount(addr, "pending")` per batch, one `eth_gasPrice`,
//! and an `eth_estimateGas` per transaction that did not set its own limit.
//! Every transaction is sent from the factory's address; a closure that
//! changes `from` fails that index.
//!
//! Signed transactions are a bincode envelope with an ed25519 signature,
//! not RLP with a secp256k1 signature. Nodes that only accept standard
//! Ethereum raw transactions will reject them.

use super::context::SigningContext;
use super::errors::TransactionBuilderError;
use super::output::IndexedResults;
use crate::metrics::metrics;
use crate::operation::{CompoundOperation, Operation, OperationError, OperationResult};
use crate::rpc_manager::{call_typed, methods, parse_quantity, to_quantity, RpcEngine};
use crate::signer::SigningWrapper;
use crate::types::{AccountId, Balance, IndexedResult};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmTransactionBuilder {
    chain_id: u64,
    nonce: u64,
    from: Option<AccountId>,
    to: Option<AccountId>,
    value: Balance,
    data: Vec<u8>,
    gas_limit: u64,
    gas_price: u128,
    signature: Option<Vec<u8>>,
}

#[derive(Serialize)]
struct EvmSigningPayload<'a> {
    chain_id: u64,
    nonce: u64,
    to: Option<&'a [u8]>,
    value: Balance,
    data: &'a [u8],
    gas_limit: u64,
    gas_price: u128,
}

#[derive(Serialize)]
struct EvmEnvelope<'a> {
    payload: EvmSigningPayload<'a>,
    from: &'a [u8],
    signature: &'a [u8],
}

impl EvmTransactionBuilder {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            nonce: 0,
            from: None,
            to: None,
            value: 0,
            data: Vec::new(),
            gas_limit: 0,
            gas_price: 0,
            signature: None,
        }
    }

    pub fn with_from(mut self, from: AccountId) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_to(mut self, to: AccountId) -> Self {
        self.to = Some(to);
        self
    }

    pub fn with_value(mut self, value: Balance) -> Self {
        self.value = value;
        self
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// A non-zero limit skips `eth_estimateGas` for this transaction
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = gas_price;
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn from(&self) -> Option<&AccountId> {
        self.from.as_ref()
    }

    pub fn to(&self) -> Option<&AccountId> {
        self.to.as_ref()
    }

    pub fn value(&self) -> Balance {
        self.value
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn gas_price(&self) -> u128 {
        self.gas_price
    }

    /// Parameters for `eth_estimateGas`
    pub fn estimate_gas_params(&self) -> Value {
        json!({
            "from": self.from.as_ref().map(AccountId::to_hex),
            "to": self.to.as_ref().map(AccountId::to_hex),
            "value": to_quantity(self.value),
            "data": format!("0x{}", hex::encode(&self.data)),
        })
    }

    fn payload(&self) -> EvmSigningPayload<'_> {
        EvmSigningPayload {
            chain_id: self.chain_id,
            nonce: self.nonce,
            to: self.to.as_ref().map(AccountId::as_bytes),
            value: self.value,
            data: &self.data,
            gas_limit: self.gas_limit,
            gas_price: self.gas_price,
        }
    }

    pub fn signing_payload(&self) -> Result<Vec<u8>, TransactionBuilderError> {
        Ok(bincode::serialize(&self.payload())?)
    }

    pub fn signing(
        mut self,
        signer: &dyn SigningWrapper,
        context: &SigningContext,
    ) -> Result<Self, TransactionBuilderError> {
        if self.from.is_none() {
            return Err(TransactionBuilderError::Incomplete(
                "sender address is not set".to_string(),
            ));
        }
        if self.gas_limit == 0 {
            return Err(TransactionBuilderError::Incomplete("gas limit is not set".to_string()));
        }

        let payload = self.signing_payload()?;
        self.signature = Some(signer.sign(&payload, context)?);
        Ok(self)
    }

    /// Encode the signed transaction
    pub fn build(&self) -> Result<Vec<u8>, TransactionBuilderError> {
        let (Some(from), Some(signature)) = (&self.from, &self.signature) else {
            return Err(TransactionBuilderError::Incomplete(
                "transaction is not signed".to_string(),
            ));
        };

        let envelope = EvmEnvelope {
            payload: self.payload(),
            from: from.as_bytes(),
            signature,
        };
        Ok(bincode::serialize(&envelope)?)
    }
}

/// Per-transaction customisation stage for EVM transactions
pub type EvmTransactionBuilderIndexedClosure =
    Arc<dyn Fn(EvmTransactionBuilder, usize) -> Result<EvmTransactionBuilder, TransactionBuilderError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEvmTransaction {
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub data: Vec<u8>,
}

impl SignedEvmTransaction {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.data))
    }

    pub fn fee(&self) -> Balance {
        u128::from(self.gas_limit).saturating_mul(self.gas_price)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvmTransactionsCreationResult {
    pub transactions: IndexedResults<SignedEvmTransaction>,
    pub sender: AccountId,
}

pub struct EvmTransactionOperationFactory {
    chain_id: u64,
    address: AccountId,
    engine: Arc<dyn RpcEngine>,
}

impl EvmTransactionOperationFactory {
    pub fn new(chain_id: u64, address: AccountId, engine: Arc<dyn RpcEngine>) -> Self {
        Self {
            chain_id,
            address,
            engine,
        }
    }

    pub fn engine(&self) -> &Arc<dyn RpcEngine> {
        &self.engine
    }

    pub fn address(&self) -> &AccountId {
        &self.address
    }

    pub fn create_transactions_operation(
        &self,
        closure: EvmTransactionBuilderIndexedClosure,
        indexes: Vec<usize>,
        signer: Arc<dyn SigningWrapper>,
    ) -> CompoundOperation<EvmTransactionsCreationResult> {
        let chain_id = self.chain_id;

        let partial_op = {
            let address = self.address.clone();
            let indexes = indexes.clone();
            Operation::closure("evm_partial_builders", move || {
                indexes
                    .iter()
                    .map(|&index| {
                        let builder = EvmTransactionBuilder::new(chain_id).with_from(address.clone());
                        closure(builder, index).map_err(OperationError::from)
                    })
                    .collect::<OperationResult<Vec<_>>>()
            })
        };

        let nonce_op = {
            let engine = self.engine.clone();
            let address = self.address.to_hex();
            Operation::new("evm_nonce", move || async move {
                let value: Value = call_typed(
                    engine.as_ref(),
                    methods::ETH_GET_TRANSACTION_COUNT,
                    json!([address, "pending"]),
                )
                .await?;
                let nonce = parse_quantity(methods::ETH_GET_TRANSACTION_COUNT, &value)?;
                let nonce = u64::try_from(nonce)
                    .map_err(|_| TransactionBuilderError::Nonce(format!("nonce {} out of range", nonce)))?;
                info!(account = %address, nonce = nonce, "EVM nonce fetched");
                Ok(nonce)
            })
        };

        let gas_price_op = {
            let engine = self.engine.clone();
            Operation::new("evm_gas_price", move || async move {
                let value: Value = call_typed(engine.as_ref(), methods::ETH_GAS_PRICE, json!([])).await?;
                Ok(parse_quantity(methods::ETH_GAS_PRICE, &value)?)
            })
        };

        let gas_limits_op = {
            let engine = self.engine.clone();
            let partial = partial_op.clone();
            let op = Operation::new("evm_estimate_gas", move || async move {
                let builders = partial.extract_no_cancellable_result_data()?;
                let estimates = builders
                    .iter()
                    .map(|builder| estimate_gas(engine.as_ref(), builder));
                let limits: Vec<Result<u64, TransactionBuilderError>> = futures::future::join_all(estimates).await;
                Ok(limits)
            });
            op.add_dependency(&partial_op);
            op
        };

        let sign_op = {
            let address = self.address.clone();
            let partial = partial_op.clone();
            let nonce = nonce_op.clone();
            let gas_price = gas_price_op.clone();
            let gas_limits = gas_limits_op.clone();
            let op = Operation::closure("evm_sign_transactions", move || {
                let builders = partial.extract_no_cancellable_result_data()?;
                let nonce = nonce.extract_no_cancellable_result_data()?;
                let gas_price = gas_price.extract_no_cancellable_result_data()?;
                let gas_limits = gas_limits.extract_no_cancellable_result_data()?;
                let context = SigningContext::Evm {
                    address: address.clone(),
                    chain_id,
                };

                let transactions = indexes
                    .iter()
                    .zip(builders.into_iter().zip(gas_limits))
                    .enumerate()
                    .map(|(position, (&index, (builder, gas_limit)))| {
                        let result = gas_limit.and_then(|gas_limit| {
                            // The batch nonce belongs to the factory's account
                            if builder.from() != Some(&address) {
                                return Err(TransactionBuilderError::Configuration(format!(
                                    "transaction sender {} differs from batch sender {}",
                                    builder.from().map(AccountId::to_hex).unwrap_or_default(),
                                    address.to_hex()
                                )));
                            }
                            let nonce = u64::try_from(position)
                                .ok()
                                .and_then(|offset| nonce.checked_add(offset))
                                .ok_or_else(|| {
                                    TransactionBuilderError::Nonce(format!(
                                        "nonce overflow at position {} (base {})",
                                        position, nonce
                                    ))
                                })?;
                            let price = if builder.gas_price() > 0 {
                                builder.gas_price()
                            } else {
                                gas_price
                            };
                            let signed = builder
                                .with_nonce(nonce)
                                .with_gas_limit(gas_limit)
                                .with_gas_price(price)
                                .signing(signer.as_ref(), &context)?;
                            Ok(SignedEvmTransaction {
                                nonce,
                                gas_limit,
                                gas_price: price,
                                data: signed.build()?,
                            })
                        });

                        match &result {
                            Ok(_) => metrics().extrinsics_signed.inc(),
                            Err(err) => {
                                metrics().signing_failures.inc();
                                metrics().record_builder_error(err.category());
                                warn!(index = index, error = %err, "Failed to sign EVM transaction");
                            }
                        }
                        IndexedResult::new(index, result)
                    })
                    .collect();

                Ok(EvmTransactionsCreationResult {
                    transactions,
                    sender: address,
                })
            });
            op.add_dependency(&partial_op);
            op.add_dependency(&nonce_op);
            op.add_dependency(&gas_price_op);
            op.add_dependency(&gas_limits_op);
            op
        };

        CompoundOperation::new(
            sign_op,
            vec![
                partial_op.node(),
                nonce_op.node(),
                gas_price_op.node(),
                gas_limits_op.node(),
            ],
        )
    }
}

async fn estimate_gas(engine: &dyn RpcEngine, builder: &EvmTransactionBuilder) -> Result<u64, TransactionBuilderError> {
    if builder.gas_limit() > 0 {
        return Ok(builder.gas_limit());
    }

    let value: Value = call_typed(
        engine,
        methods::ETH_ESTIMATE_GAS,
        json!([builder.estimate_gas_params()]),
    )
    .await?;
    let gas = parse_quantity(methods::ETH_ESTIMATE_GAS, &value)?;
    u64::try_from(gas).map_err(|_| TransactionBuilderError::internal(format!("gas estimate {} out of range", gas)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::DummySigningWrapper;

    fn address() -> AccountId {
        AccountId::new(vec![0xab; 20])
    }

    #[test]
    fn test_signing_requires_gas_limit() {
        let context = SigningContext::Evm {
            address: address(),
            chain_id: 1,
        };
        let builder = EvmTransactionBuilder::new(1).with_from(address());
        let err = builder.signing(&DummySigningWrapper, &context).unwrap_err();
        assert!(matches!(err, TransactionBuilderError::Incomplete(_)));
    }

    #[test]
    fn test_build_requires_signature() {
        let builder = EvmTransactionBuilder::new(1).with_from(address()).with_gas_limit(21_000);
        assert!(matches!(builder.build(), Err(TransactionBuilderError::Incomplete(_))));
    }

    #[test]
    fn test_signed_build_and_fee() {
        let context = SigningContext::Evm {
            address: address(),
            chain_id: 1,
        };
        let signed = EvmTransactionBuilder::new(1)
            .with_from(address())
            .with_to(AccountId::new(vec![0x01; 20]))
            .with_value(5)
            .with_gas_limit(21_000)
            .with_gas_price(3)
            .signing(&DummySigningWrapper, &context)
            .unwrap();
        assert!(!signed.build().unwrap().is_empty());

        let tx = SignedEvmTransaction {
            nonce: 0,
            gas_limit: 21_000,
            gas_price: 3,
            data: vec![],
        };
        assert_eq!(tx.fee(), 63_000);
    }

    #[tokio::test]
    async fn test_changed_sender_fails_only_that_index() {
        use crate::operation::OperationQueue;
        use crate::test_utils::{evm_account, scripted_evm_engine, MockSigner};

        let engine = scripted_evm_engine(3);
        let factory = EvmTransactionOperationFactory::new(1, evm_account().account_id, engine.clone());
        let closure: EvmTransactionBuilderIndexedClosure = Arc::new(|builder, index| {
            let builder = builder.with_to(AccountId::new(vec![0x01; 20]));
            if index == 1 {
                return Ok(builder.with_from(address()));
            }
            Ok(builder)
        });

        let queue = OperationQueue::new(4);
        let wrapper = factory.create_transactions_operation(closure, vec![0, 1, 2], Arc::new(MockSigner::new()));
        queue.add_compound(&wrapper).unwrap();
        let result = wrapper.target().wait().await.unwrap();

        assert!(matches!(
            result.transactions[1].result,
            Err(TransactionBuilderError::Configuration(_))
        ));
        assert_eq!(result.transactions[0].result.as_ref().unwrap().nonce, 3);
        assert_eq!(result.transactions[2].result.as_ref().unwrap().nonce, 5);
        assert_eq!(engine.call_count(methods::ETH_GET_TRANSACTION_COUNT), 1);
    }

    #[test]
    fn test_estimate_params() {
        let params = EvmTransactionBuilder::new(1)
            .with_from(address())
            .with_value(16)
            .with_data(vec![0xca, 0xfe])
            .estimate_gas_params();
        assert_eq!(params["value"], "0x10");
        assert_eq!(params["data"], "0xcafe");
        assert_eq!(params["to"], Value::Null);
    }
}
