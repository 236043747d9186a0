//! Fee proxy caching and in-flight deduplication

use crate::operation::{CallbackQueue, OperationQueue, OperationResult};
use crate::rpc_manager::methods;
use crate::service::{FeeDetails, FeeProxyDelegate, TransactionFee, TransactionFeeProxy, TransactionRequest};
use crate::test_utils::*;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;

#[derive(Default)]
struct RecordingDelegate {
    received: Mutex<Vec<(String, OperationResult<TransactionFee>)>>,
}

impl RecordingDelegate {
    fn identifiers(&self) -> Vec<String> {
        self.received.lock().iter().map(|(id, _)| id.clone()).collect()
    }
}

impl FeeProxyDelegate for RecordingDelegate {
    fn did_receive_fee(&self, result: OperationResult<TransactionFee>, identifier: &str) {
        self.received.lock().push((identifier.to_string(), result));
    }
}

fn attach(proxy: &TransactionFeeProxy) -> Arc<RecordingDelegate> {
    let delegate = Arc::new(RecordingDelegate::default());
    let weak: Weak<dyn FeeProxyDelegate> = Arc::downgrade(&delegate) as Weak<dyn FeeProxyDelegate>;
    proxy.set_delegate(weak);
    delegate
}

fn request() -> TransactionRequest {
    TransactionRequest::Extrinsic(transfer_closure())
}

#[tokio::test]
async fn test_in_flight_requests_are_deduplicated() {
    let engine = scripted_substrate_engine(0);
    engine.delay(methods::PAYMENT_QUERY_INFO, Duration::from_millis(30));
    let service = substrate_service(engine.clone(), Arc::default());

    let (callback_queue, mut receiver) = CallbackQueue::channel();
    let proxy = TransactionFeeProxy::new(OperationQueue::new(4), callback_queue, 8);
    let delegate = attach(&proxy);

    proxy.estimate_fee(service.as_ref(), "transfer-1", request());
    proxy.estimate_fee(service.as_ref(), "transfer-1", request());
    assert!(receiver.recv_and_run().await);

    assert_eq!(engine.call_count(methods::PAYMENT_QUERY_INFO), 1);
    assert_eq!(delegate.identifiers(), vec!["transfer-1"]);

    let (_, result) = delegate.received.lock()[0].clone();
    assert_eq!(
        result.unwrap(),
        TransactionFee {
            amount: 1000,
            payer: None,
            details: FeeDetails::Substrate { weight: 1500 },
        }
    );
}

#[tokio::test]
async fn test_loaded_entry_is_replayed_without_work() {
    let engine = scripted_substrate_engine(0);
    let service = substrate_service(engine.clone(), Arc::default());

    let (callback_queue, mut receiver) = CallbackQueue::channel();
    let proxy = TransactionFeeProxy::new(OperationQueue::new(4), callback_queue, 8);
    let delegate = attach(&proxy);

    proxy.estimate_fee(service.as_ref(), "transfer-1", request());
    assert!(receiver.recv_and_run().await);
    let calls_after_first = engine.total_calls();

    proxy.estimate_fee(service.as_ref(), "transfer-1", request());
    assert!(receiver.recv_and_run().await);

    assert_eq!(engine.total_calls(), calls_after_first);
    assert_eq!(delegate.identifiers(), vec!["transfer-1", "transfer-1"]);
}

#[tokio::test]
async fn test_distinct_identifiers_estimate_separately() {
    let engine = scripted_substrate_engine(0);
    let service = substrate_service(engine.clone(), Arc::default());

    let (callback_queue, mut receiver) = CallbackQueue::channel();
    let proxy = TransactionFeeProxy::new(OperationQueue::new(4), callback_queue, 8);
    let delegate = attach(&proxy);

    proxy.estimate_fee(service.as_ref(), "a", request());
    proxy.estimate_fee(service.as_ref(), "b", request());
    assert!(receiver.recv_and_run().await);
    assert!(receiver.recv_and_run().await);

    let mut ids = delegate.identifiers();
    ids.sort();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(engine.call_count(methods::PAYMENT_QUERY_INFO), 2);
}

#[tokio::test]
async fn test_failures_are_cached_and_cleared() {
    let engine = scripted_substrate_engine(0);
    engine.fail(methods::PAYMENT_QUERY_INFO, -32602, "invalid extrinsic");
    let service = substrate_service(engine.clone(), Arc::default());

    let (callback_queue, mut receiver) = CallbackQueue::channel();
    let proxy = TransactionFeeProxy::new(OperationQueue::new(4), callback_queue, 8);
    let delegate = attach(&proxy);

    proxy.estimate_fee(service.as_ref(), "bad", request());
    assert!(receiver.recv_and_run().await);
    assert!(delegate.received.lock()[0].1.is_err());
    assert!(proxy.is_cached("bad"));

    proxy.clear_cache();
    assert!(!proxy.is_cached("bad"));

    proxy.estimate_fee(service.as_ref(), "bad", request());
    assert!(receiver.recv_and_run().await);
    assert_eq!(engine.call_count(methods::PAYMENT_QUERY_INFO), 2);
}

#[tokio::test]
async fn test_clear_while_loading_keeps_single_estimate() {
    let engine = scripted_substrate_engine(0);
    engine.delay(methods::PAYMENT_QUERY_INFO, Duration::from_millis(50));
    let service = substrate_service(engine.clone(), Arc::default());

    let (callback_queue, mut receiver) = CallbackQueue::channel();
    let proxy = TransactionFeeProxy::new(OperationQueue::new(4), callback_queue, 8);
    let delegate = attach(&proxy);

    proxy.estimate_fee(service.as_ref(), "x", request());
    proxy.clear_cache();
    assert!(proxy.is_cached("x"));
    proxy.estimate_fee(service.as_ref(), "x", request());

    assert!(receiver.recv_and_run().await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(receiver.try_run_pending(), 0);

    assert_eq!(engine.call_count(methods::PAYMENT_QUERY_INFO), 1);
    assert_eq!(delegate.identifiers(), vec!["x"]);

    // The finished estimate lands in the cache and a later clear drops it
    assert!(proxy.is_cached("x"));
    proxy.clear_cache();
    assert!(!proxy.is_cached("x"));
}

#[tokio::test]
async fn test_capacity_bounds_loaded_entries() {
    let engine = scripted_substrate_engine(0);
    let service = substrate_service(engine, Arc::default());

    let (callback_queue, mut receiver) = CallbackQueue::channel();
    let proxy = TransactionFeeProxy::new(OperationQueue::new(4), callback_queue, 2);
    let _delegate = attach(&proxy);

    for id in ["a", "b", "c"] {
        proxy.estimate_fee(service.as_ref(), id, request());
        assert!(receiver.recv_and_run().await);
    }

    assert_eq!(proxy.cached_len(), 2);
    assert!(!proxy.is_cached("a"));
    assert!(proxy.is_cached("c"));
}

#[tokio::test]
async fn test_dropped_delegate_is_ignored() {
    let engine = scripted_substrate_engine(0);
    let service = substrate_service(engine, Arc::default());

    let (callback_queue, mut receiver) = CallbackQueue::channel();
    let proxy = TransactionFeeProxy::new(OperationQueue::new(4), callback_queue, 8);
    drop(attach(&proxy));

    proxy.estimate_fee(service.as_ref(), "orphan", request());
    assert!(receiver.recv_and_run().await);
    assert!(proxy.is_cached("orphan"));
}
