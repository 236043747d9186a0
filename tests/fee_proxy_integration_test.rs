//! Fee proxy behaviour through the public API
//!
//! Uses the scripted RPC engine from `txflow::test_utils` so the number of
//! node round-trips can be asserted per identifier.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use txflow::operation::{CallbackQueue, OperationQueue, OperationResult};
use txflow::rpc_manager::methods;
use txflow::service::{
    FeeProxyDelegate, SwapDirection, SwapFeeArgs, TransactionFee, TransactionFeeProxy, TransactionRequest,
    TransferFeeArgs,
};
use txflow::test_utils::{
    evm_service, evm_transfer_closure, recipient, scripted_evm_engine, scripted_substrate_engine, substrate_service,
    transfer_closure,
};

#[derive(Default)]
struct Collector {
    fees: Mutex<Vec<(String, OperationResult<TransactionFee>)>>,
}

impl FeeProxyDelegate for Collector {
    fn did_receive_fee(&self, result: OperationResult<TransactionFee>, identifier: &str) {
        self.fees.lock().push((identifier.to_string(), result));
    }
}

fn proxy_with_collector(capacity: usize) -> (TransactionFeeProxy, Arc<Collector>, txflow::operation::CallbackReceiver) {
    let (callback_queue, receiver) = CallbackQueue::channel();
    let proxy = TransactionFeeProxy::new(OperationQueue::new(4), callback_queue, capacity);
    let collector = Arc::new(Collector::default());
    let weak: Weak<dyn FeeProxyDelegate> = Arc::downgrade(&collector) as Weak<dyn FeeProxyDelegate>;
    proxy.set_delegate(weak);
    (proxy, collector, receiver)
}

#[tokio::test]
async fn test_transfer_fee_ids_deduplicate_requests() {
    let engine = scripted_substrate_engine(0);
    engine.delay(methods::PAYMENT_QUERY_INFO, Duration::from_millis(20));
    let service = substrate_service(engine.clone(), Arc::default());
    let (proxy, collector, mut receiver) = proxy_with_collector(16);

    let id = TransferFeeArgs::new("native", 1_000, Some(&recipient())).identifier();
    for _ in 0..3 {
        proxy.estimate_fee(service.as_ref(), id.clone(), TransactionRequest::Extrinsic(transfer_closure()));
    }
    assert!(receiver.recv_and_run().await);

    assert_eq!(engine.call_count(methods::PAYMENT_QUERY_INFO), 1);
    let fees = collector.fees.lock();
    assert_eq!(fees.len(), 1);
    assert_eq!(fees[0].0, id.as_str());
    assert_eq!(fees[0].1.as_ref().unwrap().amount, 1000);
}

#[tokio::test]
async fn test_evm_fee_is_cached_per_swap_identifier() {
    let engine = scripted_evm_engine(0);
    let service = evm_service(engine.clone(), Arc::default());
    let (proxy, collector, mut receiver) = proxy_with_collector(16);

    let sell = SwapFeeArgs::new("USDT", 10, "ETH", 1, &recipient(), SwapDirection::Sell, 50).identifier();
    let buy = SwapFeeArgs::new("USDT", 10, "ETH", 1, &recipient(), SwapDirection::Buy, 50).identifier();
    assert_ne!(sell, buy);

    proxy.estimate_fee(service.as_ref(), sell.clone(), TransactionRequest::Evm(evm_transfer_closure()));
    assert!(receiver.recv_and_run().await);
    proxy.estimate_fee(service.as_ref(), sell.clone(), TransactionRequest::Evm(evm_transfer_closure()));
    assert!(receiver.recv_and_run().await);

    assert_eq!(engine.call_count(methods::ETH_GAS_PRICE), 1);
    assert!(proxy.is_cached(sell.as_str()));
    assert!(!proxy.is_cached(buy.as_str()));

    let fees = collector.fees.lock();
    assert_eq!(fees.len(), 2);
    assert_eq!(fees[0].1, fees[1].1);
    assert_eq!(fees[0].1.as_ref().unwrap().amount, 21_000u128 * 1_000_000_000);
}
