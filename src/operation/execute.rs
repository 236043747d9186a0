//! Submitting graphs and delivering their result on a caller-chosen context

use super::call_store::CancellableCallStore;
use super::compound::CompoundOperation;
use super::errors::OperationResult;
use super::queue::OperationQueue;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send>;

/// Execution context for completion callbacks
#[derive(Clone, Default)]
pub enum CallbackQueue {
    /// Run the callback on whichever thread finished the target
    #[default]
    Inline,
    /// Hand the callback to a [`CallbackReceiver`] drained by the caller
    Channel(mpsc::UnboundedSender<Job>),
}

impl std::fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallbackQueue::Inline => write!(f, "CallbackQueue::Inline"),
            CallbackQueue::Channel(_) => write!(f, "CallbackQueue::Channel"),
        }
    }
}

impl CallbackQueue {
    pub fn inline() -> Self {
        CallbackQueue::Inline
    }

    /// Callback queue drained by the returned receiver, e.g. from a UI loop
    pub fn channel() -> (Self, CallbackReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (CallbackQueue::Channel(tx), CallbackReceiver { rx })
    }

    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            CallbackQueue::Inline => job(),
            CallbackQueue::Channel(tx) => {
                if tx.send(Box::new(job)).is_err() {
                    warn!("Callback receiver dropped, discarding callback");
                }
            }
        }
    }

    /// Dispatch `job`, holding `mutex` while it runs
    pub fn dispatch_locking<F>(&self, mutex: Option<Arc<Mutex<()>>>, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch(move || match mutex {
            Some(mutex) => {
                let _guard = mutex.lock();
                job();
            }
            None => job(),
        });
    }
}

/// Receiving side of [`CallbackQueue::channel`]
pub struct CallbackReceiver {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl CallbackReceiver {
    /// Wait for the next callback and run it. Returns `false` once every
    /// sender is gone.
    pub async fn recv_and_run(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run every callback already queued, without waiting
    pub fn try_run_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            count += 1;
        }
        count
    }

    /// Drain callbacks until all senders are dropped
    pub async fn run(mut self) {
        while self.recv_and_run().await {}
    }
}

/// Submit `wrapper` to `queue` and deliver the target's result to `callback`.
///
/// The callback fires exactly once on `callback_queue` with the target's
/// success or failure. It never fires if the graph is cancelled first.
pub fn execute<T, F>(
    wrapper: &CompoundOperation<T>,
    queue: &OperationQueue,
    callback_queue: &CallbackQueue,
    callback: F,
) where
    T: Clone + Send + Sync + 'static,
    F: FnOnce(OperationResult<T>) + Send + 'static,
{
    let nodes = match queue.prepare(wrapper.all_operations()) {
        Ok(nodes) => nodes,
        Err(err) => {
            callback_queue.dispatch(move || callback(Err(err)));
            return;
        }
    };

    let observed = wrapper.clone();
    let delivery = callback_queue.clone();
    wrapper.target().set_completion_block(move || {
        delivery.dispatch(move || {
            if observed.is_cancelled() {
                debug!(operation = %observed.target().name(), "Skipping callback of cancelled graph");
                return;
            }
            callback(observed.target().extract_no_cancellable_result_data());
        });
    });

    queue.enqueue(nodes);
}

/// Like [`execute`], but tracks `wrapper` in `store`.
///
/// The callback first checks that `wrapper` is still the stored call and
/// clears the slot; when a newer call replaced it the result is dropped.
/// `mutex`, when given, is held while the callback runs. It must not be held
/// by the caller of this function when `callback_queue` is inline.
pub fn execute_cancellable<T, F>(
    wrapper: &CompoundOperation<T>,
    queue: &OperationQueue,
    store: &Arc<CancellableCallStore>,
    callback_queue: &CallbackQueue,
    mutex: Option<Arc<Mutex<()>>>,
    callback: F,
) where
    T: Clone + Send + Sync + 'static,
    F: FnOnce(OperationResult<T>) + Send + 'static,
{
    let nodes = match queue.prepare(wrapper.all_operations()) {
        Ok(nodes) => nodes,
        Err(err) => {
            callback_queue.dispatch_locking(mutex, move || callback(Err(err)));
            return;
        }
    };

    store.store(wrapper.clone());

    let observed = wrapper.clone();
    let store = store.clone();
    let delivery = callback_queue.clone();
    wrapper.target().set_completion_block(move || {
        delivery.dispatch_locking(mutex, move || {
            if !store.clear_if_matches(&observed) {
                debug!(operation = %observed.target().name(), "Dropping superseded result");
                return;
            }
            if observed.is_cancelled() {
                return;
            }
            callback(observed.target().extract_no_cancellable_result_data());
        });
    });

    queue.enqueue(nodes);
}
