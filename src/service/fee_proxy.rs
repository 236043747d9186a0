//! Fee Proxy
//!
//! Caches fee estimates by reuse identifier and deduplicates in-flight
//! requests. Results, failures included, are broadcast to the current
//! delegate on the proxy's callback queue.

use super::{TransactionFee, TransactionRequest, TransactionService};
use crate::metrics::metrics;
use crate::operation::{execute, CallbackQueue, OperationQueue, OperationResult};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use tracing::debug;

pub trait FeeProxyDelegate: Send + Sync {
    fn did_receive_fee(&self, result: OperationResult<TransactionFee>, identifier: &str);
}

#[derive(Debug, Clone)]
enum FeeCacheState {
    Loading,
    Loaded(OperationResult<TransactionFee>),
}

/// Identifier → state, with LRU order over loaded entries only
#[derive(Debug)]
struct FeeCache {
    entries: HashMap<String, FeeCacheState>,
    lru: VecDeque<String>,
    capacity: usize,
}

impl FeeCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn touch(&mut self, identifier: &str) {
        if let Some(pos) = self.lru.iter().position(|id| id == identifier) {
            if let Some(id) = self.lru.remove(pos) {
                self.lru.push_back(id);
            }
        }
    }

    fn store(&mut self, identifier: String, result: OperationResult<TransactionFee>) {
        self.lru.retain(|id| id != &identifier);
        self.lru.push_back(identifier.clone());
        self.entries.insert(identifier, FeeCacheState::Loaded(result));

        while self.lru.len() > self.capacity {
            if let Some(evicted) = self.lru.pop_front() {
                self.entries.remove(&evicted);
                metrics().fee_cache_evictions.inc();
                debug!(identifier = %evicted, "Evicted cached fee");
            }
        }
        metrics().fee_cache_entries.set(self.entries.len() as i64);
    }

    /// Drop loaded entries; in-flight estimates keep their slot
    fn clear(&mut self) {
        self.entries
            .retain(|_, state| matches!(state, FeeCacheState::Loading));
        self.lru.clear();
        metrics().fee_cache_entries.set(self.entries.len() as i64);
    }
}

type DelegateSlot = Arc<RwLock<Option<Weak<dyn FeeProxyDelegate>>>>;

pub struct TransactionFeeProxy {
    queue: OperationQueue,
    callback_queue: CallbackQueue,
    cache: Arc<Mutex<FeeCache>>,
    delegate: DelegateSlot,
}

impl TransactionFeeProxy {
    pub fn new(queue: OperationQueue, callback_queue: CallbackQueue, capacity: usize) -> Self {
        Self {
            queue,
            callback_queue,
            cache: Arc::new(Mutex::new(FeeCache::new(capacity))),
            delegate: Arc::new(RwLock::new(None)),
        }
    }

    /// The proxy does not keep the delegate alive
    pub fn set_delegate(&self, delegate: Weak<dyn FeeProxyDelegate>) {
        *self.delegate.write() = Some(delegate);
    }

    pub fn estimate_fee(
        &self,
        service: &dyn TransactionService,
        reuse_identifier: impl Into<String>,
        request: TransactionRequest,
    ) {
        let identifier = reuse_identifier.into();

        {
            let mut cache = self.cache.lock();
            match cache.entries.get(&identifier).cloned() {
                Some(FeeCacheState::Loaded(result)) => {
                    cache.touch(&identifier);
                    drop(cache);
                    metrics().fee_cache_hits.inc();

                    let delegate = self.delegate.clone();
                    self.callback_queue
                        .dispatch(move || notify(&delegate, result, &identifier));
                    return;
                }
                Some(FeeCacheState::Loading) => {
                    debug!(identifier = %identifier, "Fee estimate already in flight");
                    return;
                }
                None => {
                    cache.entries.insert(identifier.clone(), FeeCacheState::Loading);
                    metrics().fee_cache_misses.inc();
                }
            }
        }

        let wrapper = service.estimate_fee_single_operation(request);
        let cache = self.cache.clone();
        let delegate = self.delegate.clone();
        execute(&wrapper, &self.queue, &self.callback_queue, move |result| {
            cache.lock().store(identifier.clone(), result.clone());
            notify(&delegate, result, &identifier);
        });
    }

    /// Forget loaded results. Estimates still in flight are kept so a repeat
    /// request keeps waiting for them instead of starting a second one.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Whether a result or an in-flight estimate exists for `identifier`
    pub fn is_cached(&self, identifier: &str) -> bool {
        self.cache.lock().entries.contains_key(identifier)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().entries.len()
    }
}

fn notify(delegate: &DelegateSlot, result: OperationResult<TransactionFee>, identifier: &str) {
    let delegate = delegate.read().as_ref().and_then(Weak::upgrade);
    match delegate {
        Some(delegate) => delegate.did_receive_fee(result, identifier),
        None => debug!(identifier = %identifier, "No fee delegate attached"),
    }
}
