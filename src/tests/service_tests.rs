//! Transaction services over both chain families

use crate::operation::{CallbackQueue, OperationError, OperationQueue};
use crate::rpc_manager::methods;
use crate::runtime::RpcRuntimeProvider;
use crate::service::{
    create_transaction_service, estimate_fee, submit, FeeDetails, InMemoryHistoryStore, ServiceDependencies,
    TransactionRequest,
};
use crate::test_utils::*;
use crate::tx_builder::{ImmortalEraOperationFactory, TransactionBuilderError};
use crate::runtime::RuntimeMetadata;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_substrate_submit_in_index_order_and_persists() {
    let engine = scripted_substrate_engine(5);
    let history = Arc::new(InMemoryHistoryStore::new());
    let service = substrate_service(engine.clone(), history.clone());
    let queue = OperationQueue::new(4);

    let wrapper = service.submit_operation(
        TransactionRequest::Extrinsic(transfer_closure()),
        Arc::new(MockSigner::new()),
        vec![0, 1, 2],
    );
    queue.add_compound(&wrapper).unwrap();
    let results = wrapper.target().wait().await.unwrap();

    let hashes: Vec<String> = results.iter().map(|item| item.result.clone().unwrap()).collect();
    assert_eq!(
        hashes,
        vec![
            format!("0x{:064x}", 1),
            format!("0x{:064x}", 2),
            format!("0x{:064x}", 3)
        ]
    );

    let nonces: Vec<u64> = history.records().iter().map(|record| record.nonce).collect();
    assert_eq!(nonces, vec![5, 6, 7]);
    assert!(history.records().iter().all(|record| record.chain_id == "local"));
}

#[tokio::test]
async fn test_substrate_submit_skips_failed_signatures() {
    let engine = scripted_substrate_engine(0);
    let history = Arc::new(InMemoryHistoryStore::new());
    let service = substrate_service(engine.clone(), history.clone());
    let queue = OperationQueue::new(4);

    let wrapper = service.submit_operation(
        TransactionRequest::Extrinsic(transfer_closure()),
        Arc::new(FailingSigner::failing_at([0])),
        vec![0, 1],
    );
    queue.add_compound(&wrapper).unwrap();
    let results = wrapper.target().wait().await.unwrap();

    assert!(matches!(results[0].result, Err(TransactionBuilderError::Signing(_))));
    assert!(results[1].is_ok());
    assert_eq!(engine.call_count(methods::AUTHOR_SUBMIT_EXTRINSIC), 1);
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_substrate_fee_via_runtime_call() {
    let engine = scripted_substrate_engine(0);
    let dispatch_info = bincode::serialize(&(42u64, 0u8, 777u128)).unwrap();
    engine.respond(methods::STATE_CALL, json!(format!("0x{}", hex::encode(dispatch_info))));

    let mut chain = test_chain();
    chain.fee_via_runtime_call = true;
    let deps = ServiceDependencies::new(engine.clone(), test_account())
        .with_runtime(static_runtime())
        .with_era_factory(Arc::new(ImmortalEraOperationFactory));
    let service = create_transaction_service(chain, deps).unwrap();
    let queue = OperationQueue::new(4);

    let wrapper = service.estimate_fee_single_operation(TransactionRequest::Extrinsic(transfer_closure()));
    queue.add_compound(&wrapper).unwrap();
    let fee = wrapper.target().wait().await.unwrap();

    assert_eq!(fee.amount, 777);
    assert_eq!(fee.details, FeeDetails::Substrate { weight: 42 });
    assert_eq!(engine.call_count(methods::PAYMENT_QUERY_INFO), 0);
    assert_eq!(
        engine.params_of(methods::STATE_CALL)[0][0],
        json!("TransactionPaymentApi_query_info")
    );
}

#[tokio::test]
async fn test_runtime_version_fetched_once_across_requests() {
    let engine = scripted_substrate_engine(0);
    engine.respond(
        methods::STATE_GET_RUNTIME_VERSION,
        json!({ "specVersion": 9430, "transactionVersion": 24 }),
    );
    let runtime = Arc::new(RpcRuntimeProvider::new(engine.clone(), RuntimeMetadata::standard()));
    let deps = ServiceDependencies::new(engine.clone(), test_account())
        .with_runtime(runtime.clone())
        .with_era_factory(Arc::new(ImmortalEraOperationFactory));
    let service = create_transaction_service(test_chain(), deps).unwrap();
    let queue = OperationQueue::new(4);

    for _ in 0..2 {
        let wrapper = service.estimate_fee_single_operation(TransactionRequest::Extrinsic(transfer_closure()));
        queue.add_compound(&wrapper).unwrap();
        wrapper.target().wait().await.unwrap();
    }

    assert_eq!(engine.call_count(methods::STATE_GET_RUNTIME_VERSION), 1);
    assert_eq!(runtime.cached().map(|coder| coder.spec_version), Some(9430));
}

#[tokio::test]
async fn test_build_operation_returns_signed_hex() {
    let engine = scripted_substrate_engine(0);
    let service = substrate_service(engine.clone(), Arc::default());
    let queue = OperationQueue::new(4);

    let wrapper = service.build_operation(
        TransactionRequest::Extrinsic(transfer_closure()),
        Arc::new(MockSigner::new()),
    );
    queue.add_compound(&wrapper).unwrap();
    let hex = wrapper.target().wait().await.unwrap();

    assert!(hex.starts_with("0x84"));
    assert_eq!(engine.call_count(methods::AUTHOR_SUBMIT_EXTRINSIC), 0);
}

#[tokio::test]
async fn test_family_mismatch_is_rejected() {
    let substrate = substrate_service(scripted_substrate_engine(0), Arc::default());
    let evm = evm_service(scripted_evm_engine(0), Arc::default());
    let queue = OperationQueue::new(2);

    let wrapper = substrate.estimate_fee_single_operation(TransactionRequest::Evm(evm_transfer_closure()));
    queue.add_compound(&wrapper).unwrap();
    assert!(matches!(
        wrapper.target().wait().await,
        Err(OperationError::Builder(TransactionBuilderError::UnsupportedRequest(_)))
    ));

    let wrapper = evm.estimate_fee_single_operation(TransactionRequest::Extrinsic(transfer_closure()));
    queue.add_compound(&wrapper).unwrap();
    assert!(matches!(
        wrapper.target().wait().await,
        Err(OperationError::Builder(TransactionBuilderError::UnsupportedRequest(_)))
    ));
}

#[test]
fn test_evm_service_requires_ethereum_account() {
    let deps = ServiceDependencies::new(scripted_evm_engine(0), test_account());
    let result = create_transaction_service(crate::types::ChainModel::evm("eth", "Ethereum", 1), deps);
    assert!(matches!(result, Err(TransactionBuilderError::Configuration(_))));
}

#[tokio::test]
async fn test_evm_batch_nonces_and_fees() {
    let engine = scripted_evm_engine(7);
    let service = evm_service(engine.clone(), Arc::default());
    let queue = OperationQueue::new(4);

    let wrapper = service.estimate_fee_operation(TransactionRequest::Evm(evm_transfer_closure()), vec![0, 1, 2]);
    queue.add_compound(&wrapper).unwrap();
    let fees = wrapper.target().wait().await.unwrap();

    assert_eq!(fees.len(), 3);
    for item in &fees {
        let fee = item.result.as_ref().unwrap();
        assert_eq!(fee.amount, 21_000u128 * 1_000_000_000);
        assert_eq!(
            fee.details,
            FeeDetails::Evm {
                gas_limit: 21_000,
                gas_price: 1_000_000_000
            }
        );
    }
    assert_eq!(engine.call_count(methods::ETH_GET_TRANSACTION_COUNT), 1);
    assert_eq!(engine.call_count(methods::ETH_ESTIMATE_GAS), 3);
    assert_eq!(
        engine.params_of(methods::ETH_GET_TRANSACTION_COUNT),
        vec![json!([evm_account().account_id.to_hex(), "pending"])]
    );
}

#[tokio::test]
async fn test_evm_submit_uses_consecutive_nonces() {
    let engine = scripted_evm_engine(7);
    let history = Arc::new(InMemoryHistoryStore::new());
    let service = evm_service(engine.clone(), history.clone());
    let queue = OperationQueue::new(4);
    let (callback_queue, mut receiver) = CallbackQueue::channel();
    let (tx, rx) = tokio::sync::oneshot::channel();

    submit(
        service.as_ref(),
        TransactionRequest::Evm(evm_transfer_closure()),
        Arc::new(MockSigner::new()),
        vec![0, 1, 2],
        &queue,
        &callback_queue,
        move |result| {
            let _ = tx.send(result);
        },
    );
    assert!(receiver.recv_and_run().await);

    let results = rx.await.unwrap().unwrap();
    assert!(results.iter().all(|item| item.is_ok()));
    let nonces: Vec<u64> = history.records().iter().map(|record| record.nonce).collect();
    assert_eq!(nonces, vec![7, 8, 9]);
    assert_eq!(engine.call_count(methods::ETH_SEND_RAW_TRANSACTION), 3);
}

#[tokio::test]
async fn test_estimate_fee_callback_with_delegated_payer() {
    use crate::tx_builder::{ProxyDefinition, ProxyResolutionFactory, ProxyType};
    use crate::types::{AccountId, ChainAccount, CryptoType};

    let engine = scripted_substrate_engine(0);
    let delegate = ChainAccount::new(AccountId::new(vec![0x44; 32]), CryptoType::Sr25519);
    let deps = ServiceDependencies::new(engine, test_account())
        .with_runtime(static_runtime())
        .with_era_factory(Arc::new(ImmortalEraOperationFactory))
        .with_sender_factory(Arc::new(ProxyResolutionFactory::new(
            test_account().account_id,
            vec![ProxyDefinition {
                delegate: delegate.clone(),
                proxy_type: ProxyType::Any,
            }],
        )));
    let service = create_transaction_service(test_chain(), deps).unwrap();
    let queue = OperationQueue::new(4);
    let (callback_queue, mut receiver) = CallbackQueue::channel();
    let (tx, rx) = tokio::sync::oneshot::channel();

    estimate_fee(
        service.as_ref(),
        TransactionRequest::Extrinsic(transfer_closure()),
        vec![0],
        &queue,
        &callback_queue,
        move |result| {
            let _ = tx.send(result);
        },
    );
    assert!(receiver.recv_and_run().await);

    let fees = rx.await.unwrap().unwrap();
    assert_eq!(fees[0].result.as_ref().unwrap().payer, Some(delegate.account_id));
}
