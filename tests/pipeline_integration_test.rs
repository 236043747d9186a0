//! End-to-end pipeline tests against a JSON-RPC node served over HTTP
//!
//! Validates:
//! - Batch construction and submission through the HTTP engine
//! - ed25519 signatures produced by the local signer
//! - Per-index submission failures
//! - Engine and graph behaviour through the public API

use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;
use std::sync::Arc;
use txflow::operation::{CompoundOperation, Operation, OperationQueue};
use txflow::rpc_manager::HttpRpcEngine;
use txflow::service::{create_transaction_service, InMemoryHistoryStore, ServiceDependencies, TransactionRequest};
use txflow::signer::Ed25519SigningWrapper;
use txflow::test_utils::{genesis_hash, static_runtime, test_chain, transfer_closure};
use txflow::tx_builder::{ImmortalEraOperationFactory, TransactionBuilderError};
use std::time::Duration;

async fn mock_method(server: &mut ServerGuard, method: &str, result: serde_json::Value) -> Mock {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": method })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string())
        .create_async()
        .await
}

fn signer() -> Arc<Ed25519SigningWrapper> {
    Arc::new(Ed25519SigningWrapper::from_seed(&[7u8; 32]).unwrap())
}

#[tokio::test]
async fn test_submit_batch_over_http() {
    let mut server = mockito::Server::new_async().await;
    let genesis = mock_method(&mut server, "chain_getBlockHash", json!(genesis_hash().to_hex())).await;
    let nonce = mock_method(&mut server, "system_accountNextIndex", json!(12)).await;
    let submit = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "author_submitExtrinsic" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0xabcd"}"#)
        .expect(2)
        .create_async()
        .await;

    let key = signer();
    let engine = Arc::new(HttpRpcEngine::new(server.url(), Duration::from_secs(5)).unwrap());
    let history = Arc::new(InMemoryHistoryStore::new());
    let deps = ServiceDependencies::new(engine, key.chain_account())
        .with_runtime(static_runtime())
        .with_era_factory(Arc::new(ImmortalEraOperationFactory))
        .with_history(history.clone());
    let service = create_transaction_service(test_chain(), deps).unwrap();

    let queue = OperationQueue::new(4);
    let wrapper = service.submit_operation(TransactionRequest::Extrinsic(transfer_closure()), key, vec![0, 1]);
    queue.add_compound(&wrapper).unwrap();
    let results = wrapper.target().wait().await.unwrap();

    assert!(results.iter().all(|item| item.result.as_deref() == Ok("0xabcd")));
    assert_eq!(
        history.records().iter().map(|r| r.nonce).collect::<Vec<_>>(),
        vec![12, 13]
    );

    genesis.assert_async().await;
    nonce.assert_async().await;
    submit.assert_async().await;
}

#[tokio::test]
async fn test_rejected_submission_is_reported_per_index() {
    let mut server = mockito::Server::new_async().await;
    let _genesis = mock_method(&mut server, "chain_getBlockHash", json!(genesis_hash().to_hex())).await;
    let _nonce = mock_method(&mut server, "system_accountNextIndex", json!(0)).await;
    let _submit = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "author_submitExtrinsic" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":1010,"message":"Invalid Transaction","data":"Inability to pay some fees"}}"#)
        .create_async()
        .await;

    let key = signer();
    let engine = Arc::new(HttpRpcEngine::new(server.url(), Duration::from_secs(5)).unwrap());
    let history = Arc::new(InMemoryHistoryStore::new());
    let deps = ServiceDependencies::new(engine, key.chain_account())
        .with_runtime(static_runtime())
        .with_era_factory(Arc::new(ImmortalEraOperationFactory))
        .with_history(history.clone());
    let service = create_transaction_service(test_chain(), deps).unwrap();

    let queue = OperationQueue::new(4);
    let wrapper = service.submit_operation(TransactionRequest::Extrinsic(transfer_closure()), key, vec![3]);
    queue.add_compound(&wrapper).unwrap();
    let results = wrapper.target().wait().await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].index, 3);
    match &results[0].result {
        Err(TransactionBuilderError::Rpc(err)) => assert!(err.to_string().contains("Inability to pay")),
        other => panic!("expected rpc error, got {:?}", other),
    }
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_mapped_compound_through_public_api() {
    let queue = OperationQueue::new(2);
    let base = Operation::new("base", || async { Ok(20u32) });
    let wrapper = CompoundOperation::from_operation(base).map("plus_one", |value| Ok(value + 1));

    queue.add_compound(&wrapper).unwrap();
    assert_eq!(wrapper.target().wait().await.unwrap(), 21);
}
