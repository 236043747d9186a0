//! Single-result asynchronous operation
//!
//! An [`Operation`] owns one unit of work and produces exactly one
//! `Result<T, OperationError>`. It records upstream operations it depends on;
//! the [`OperationQueue`](super::OperationQueue) starts it only after every
//! dependency reached a terminal state.

use super::errors::{OperationError, OperationResult};
use crate::metrics::metrics;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Process-unique operation identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Observable lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Executing,
    Succeeded,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Succeeded | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}

/// Type-erased view of an operation used by the scheduler and graphs
pub trait OperationNode: Send + Sync {
    fn id(&self) -> OperationId;
    fn name(&self) -> &str;
    fn status(&self) -> OperationStatus;
    fn dependencies(&self) -> Vec<Arc<dyn OperationNode>>;
    fn add_dependency_node(&self, node: Arc<dyn OperationNode>);
    fn cancel(&self);

    /// Error of a failed operation, `None` otherwise
    fn failure(&self) -> Option<OperationError>;

    fn subscribe(&self) -> watch::Receiver<OperationStatus>;

    /// Returns `true` only for the first caller; used for enqueue deduplication
    fn try_mark_enqueued(&self) -> bool;

    /// Wait for dependencies, take a worker permit and execute the body
    fn run(self: Arc<Self>, permits: Arc<Semaphore>) -> BoxFuture<'static, ()>;
}

/// Anything that can be handed to the queue or used as a dependency
pub trait AsOperationNode {
    fn as_node(&self) -> Arc<dyn OperationNode>;
}

impl AsOperationNode for Arc<dyn OperationNode> {
    fn as_node(&self) -> Arc<dyn OperationNode> {
        self.clone()
    }
}

type Body<T> = Box<dyn FnOnce() -> BoxFuture<'static, OperationResult<T>> + Send>;
type CompletionBlock = Box<dyn FnOnce() + Send>;

enum Slot<T> {
    Pending,
    Executing,
    Finished(OperationResult<T>),
    Cancelled,
}

struct OperationInner<T> {
    id: OperationId,
    name: String,
    body: Mutex<Option<Body<T>>>,
    slot: Mutex<Slot<T>>,
    dependencies: Mutex<Vec<Arc<dyn OperationNode>>>,
    completion: Mutex<Option<CompletionBlock>>,
    status: watch::Sender<OperationStatus>,
    token: CancellationToken,
    enqueued: AtomicBool,
}

/// Handle to a single-result operation. Cloning shares the same operation.
pub struct Operation<T> {
    inner: Arc<OperationInner<T>>,
}

impl<T> Clone for Operation<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("status", &*self.inner.status.borrow())
            .finish()
    }
}

impl<T> Operation<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn with_slot(name: impl Into<String>, body: Option<Body<T>>, slot: Slot<T>, status: OperationStatus) -> Self {
        let (status, _) = watch::channel(status);
        Self {
            inner: Arc::new(OperationInner {
                id: OperationId::next(),
                name: name.into(),
                body: Mutex::new(body),
                slot: Mutex::new(slot),
                dependencies: Mutex::new(Vec::new()),
                completion: Mutex::new(None),
                status,
                token: CancellationToken::new(),
                enqueued: AtomicBool::new(false),
            }),
        }
    }

    /// Create an operation from an async body
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = OperationResult<T>> + Send + 'static,
    {
        let body: Body<T> = Box::new(move || body().boxed());
        Self::with_slot(name, Some(body), Slot::Pending, OperationStatus::Pending)
    }

    /// Create an operation from a synchronous body (encoding, signing)
    pub fn closure<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce() -> OperationResult<T> + Send + 'static,
    {
        Self::new(name, move || futures::future::ready(body()))
    }

    /// Create an already finished operation
    pub fn from_result(name: impl Into<String>, result: OperationResult<T>) -> Self {
        let status = if result.is_ok() {
            OperationStatus::Succeeded
        } else {
            OperationStatus::Failed
        };
        Self::with_slot(name, None, Slot::Finished(result), status)
    }

    pub fn id(&self) -> OperationId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn status(&self) -> OperationStatus {
        *self.inner.status.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.inner.slot.lock(), Slot::Cancelled)
    }

    pub fn is_finished(&self) -> bool {
        matches!(*self.inner.slot.lock(), Slot::Finished(_))
    }

    /// Declare that this operation must not start before `other` finished.
    ///
    /// Dependencies are expected to be declared before the operation is
    /// handed to a queue.
    pub fn add_dependency(&self, other: &impl AsOperationNode) {
        self.inner.add_dependency_node(other.as_node());
    }

    pub fn dependencies(&self) -> Vec<Arc<dyn OperationNode>> {
        self.inner.dependencies()
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Register a block invoked once the operation succeeds or fails.
    ///
    /// Never invoked for a cancelled operation. If the operation already
    /// finished, the block runs immediately on the calling thread.
    pub fn set_completion_block<F>(&self, block: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.inner.completion.lock() = Some(Box::new(block));

        if self.is_finished() {
            let block = self.inner.completion.lock().take();
            if let Some(block) = block {
                block();
            }
        }
    }

    /// Result of a finished operation.
    ///
    /// Cancelled operations yield [`OperationError::Cancelled`]; operations
    /// without a result yield [`OperationError::UnexpectedDependentResult`].
    pub fn extract_no_cancellable_result_data(&self) -> OperationResult<T> {
        match &*self.inner.slot.lock() {
            Slot::Finished(result) => result.clone(),
            Slot::Cancelled => Err(OperationError::Cancelled),
            Slot::Pending | Slot::Executing => Err(OperationError::UnexpectedDependentResult),
        }
    }

    /// Wait until the operation reaches a terminal state and return its result
    pub async fn wait(&self) -> OperationResult<T> {
        let mut rx = self.inner.status.subscribe();
        let _ = rx.wait_for(|status| status.is_terminal()).await;
        self.extract_no_cancellable_result_data()
    }

    pub fn node(&self) -> Arc<dyn OperationNode> {
        self.inner.clone()
    }
}

impl<T> AsOperationNode for Operation<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn as_node(&self) -> Arc<dyn OperationNode> {
        self.node()
    }
}

impl<T> OperationInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn finish(&self, result: OperationResult<T>) {
        let status = match &result {
            Ok(_) => OperationStatus::Succeeded,
            Err(_) => OperationStatus::Failed,
        };

        {
            let mut slot = self.slot.lock();
            if matches!(*slot, Slot::Cancelled | Slot::Finished(_)) {
                debug!(operation = %self.name, id = %self.id, "Discarding result of cancelled operation");
                return;
            }
            *slot = Slot::Finished(result);
        }

        match status {
            OperationStatus::Succeeded => metrics().operations_succeeded.inc(),
            _ => metrics().operations_failed.inc(),
        }
        self.status.send_replace(status);

        let completion = self.completion.lock().take();
        if let Some(completion) = completion {
            completion();
        }
    }

    async fn wait_for_dependency(&self, dependency: &Arc<dyn OperationNode>) -> Option<OperationStatus> {
        let mut rx = dependency.subscribe();
        tokio::select! {
            _ = self.token.cancelled() => None,
            outcome = rx.wait_for(|status| status.is_terminal()) => {
                Some(outcome.map(|status| *status).unwrap_or_else(|_| dependency.status()))
            }
        }
    }
}

impl<T> OperationNode for OperationInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn id(&self) -> OperationId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> OperationStatus {
        *self.status.borrow()
    }

    fn dependencies(&self) -> Vec<Arc<dyn OperationNode>> {
        self.dependencies.lock().clone()
    }

    fn add_dependency_node(&self, node: Arc<dyn OperationNode>) {
        let mut dependencies = self.dependencies.lock();
        if !dependencies.iter().any(|existing| existing.id() == node.id()) {
            dependencies.push(node);
        }
    }

    fn cancel(&self) {
        {
            let mut slot = self.slot.lock();
            if matches!(*slot, Slot::Cancelled | Slot::Finished(_)) {
                return;
            }
            *slot = Slot::Cancelled;
        }

        self.body.lock().take();
        self.completion.lock().take();
        self.token.cancel();
        self.status.send_replace(OperationStatus::Cancelled);
        metrics().operations_cancelled.inc();
        debug!(operation = %self.name, id = %self.id, "Operation cancelled");
    }

    fn failure(&self) -> Option<OperationError> {
        match &*self.slot.lock() {
            Slot::Finished(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }

    fn subscribe(&self) -> watch::Receiver<OperationStatus> {
        self.status.subscribe()
    }

    fn try_mark_enqueued(&self) -> bool {
        !self.enqueued.swap(true, Ordering::AcqRel)
    }

    fn run(self: Arc<Self>, permits: Arc<Semaphore>) -> BoxFuture<'static, ()> {
        async move {
            for dependency in self.dependencies() {
                match self.wait_for_dependency(&dependency).await {
                    None => return,
                    Some(OperationStatus::Failed) => {
                        let err = dependency
                            .failure()
                            .unwrap_or(OperationError::UnexpectedDependentResult);
                        debug!(
                            operation = %self.name,
                            dependency = %dependency.name(),
                            error = %err,
                            "Dependency failed, propagating"
                        );
                        self.finish(Err(err));
                        return;
                    }
                    Some(OperationStatus::Cancelled) => {
                        self.cancel();
                        return;
                    }
                    Some(_) => {}
                }
            }

            let _permit = tokio::select! {
                _ = self.token.cancelled() => return,
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!(operation = %self.name, "Worker pool closed before operation started");
                        self.finish(Err(OperationError::QueueClosed));
                        return;
                    }
                },
            };

            let body = {
                let mut slot = self.slot.lock();
                if !matches!(*slot, Slot::Pending) {
                    return;
                }
                *slot = Slot::Executing;
                self.body.lock().take()
            };

            let Some(body) = body else {
                self.finish(Err(OperationError::UnexpectedDependentResult));
                return;
            };

            self.status.send_replace(OperationStatus::Executing);
            debug!(operation = %self.name, id = %self.id, "Operation started");

            metrics().operations_running.inc();
            let started = Instant::now();
            let result = tokio::select! {
                _ = self.token.cancelled() => None,
                result = body() => Some(result),
            };
            metrics().operations_running.dec();
            metrics()
                .operation_latency
                .observe(started.elapsed().as_secs_f64());

            // Cancelled mid-flight: the body was dropped at its last await
            let Some(result) = result else {
                return;
            };

            if let Err(err) = &result {
                debug!(operation = %self.name, id = %self.id, error = %err, "Operation failed");
            }

            self.finish(result);
        }
        .boxed()
    }
}
