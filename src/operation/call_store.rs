use super::compound::CompoundOperation;
use super::operation::{Operation, OperationId};
use parking_lot::Mutex;
use tracing::debug;

/// Something the call store can track and cancel
pub trait Cancellable: Send + Sync {
    /// Identity used for compare-and-clear
    fn call_id(&self) -> OperationId;
    fn cancel(&self);
}

impl<T> Cancellable for Operation<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn call_id(&self) -> OperationId {
        self.id()
    }

    fn cancel(&self) {
        Operation::cancel(self);
    }
}

impl<T> Cancellable for CompoundOperation<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn call_id(&self) -> OperationId {
        self.id()
    }

    fn cancel(&self) {
        CompoundOperation::cancel(self);
    }
}

/// Slot holding the one in-flight call of a logical operation.
///
/// Storing a new call orphans the previous one: its completion sees
/// [`clear_if_matches`](Self::clear_if_matches) return `false` and drops
/// the result.
#[derive(Default)]
pub struct CancellableCallStore {
    call: Mutex<Option<Box<dyn Cancellable>>>,
}

impl std::fmt::Debug for CancellableCallStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let call = self.call.lock().as_ref().map(|call| call.call_id());
        f.debug_struct("CancellableCallStore").field("call", &call).finish()
    }
}

impl CancellableCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current call without cancelling the previous one
    pub fn store(&self, call: impl Cancellable + 'static) {
        *self.call.lock() = Some(Box::new(call));
    }

    /// Forget the current call without cancelling it
    pub fn clear(&self) {
        self.call.lock().take();
    }

    /// Take the current call and cancel it outside the lock
    pub fn cancel(&self) {
        let call = self.call.lock().take();
        if let Some(call) = call {
            debug!(call = %call.call_id(), "Cancelling tracked call");
            call.cancel();
        }
    }

    /// Clear the slot if it still holds `call`.
    ///
    /// Returns `false` when the slot is empty or holds a different call.
    pub fn clear_if_matches(&self, call: &dyn Cancellable) -> bool {
        let mut slot = self.call.lock();
        match slot.as_ref() {
            Some(current) if current.call_id() == call.call_id() => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    pub fn matches(&self, call: &dyn Cancellable) -> bool {
        self.call
            .lock()
            .as_ref()
            .map(|current| current.call_id() == call.call_id())
            .unwrap_or(false)
    }

    pub fn has_call(&self) -> bool {
        self.call.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapper(value: u32) -> CompoundOperation<u32> {
        CompoundOperation::from_operation(Operation::closure("call", move || Ok(value)))
    }

    #[test]
    fn test_store_replaces_previous() {
        let store = CancellableCallStore::new();
        let a = wrapper(1);
        let b = wrapper(2);

        store.store(a.clone());
        store.store(b.clone());

        assert!(!store.matches(&a));
        assert!(store.matches(&b));
        assert!(!store.clear_if_matches(&a));
        assert!(store.has_call());
        assert!(store.clear_if_matches(&b));
        assert!(!store.has_call());
    }

    #[test]
    fn test_clear_does_not_cancel() {
        let store = CancellableCallStore::new();
        let a = wrapper(1);
        store.store(a.clone());
        store.clear();

        assert!(!store.has_call());
        assert!(!a.is_cancelled());
    }

    #[test]
    fn test_cancel_takes_and_cancels() {
        let store = CancellableCallStore::new();
        let a = wrapper(1);
        store.store(a.clone());
        store.cancel();

        assert!(!store.has_call());
        assert!(a.is_cancelled());

        // Second cancel is a no-op
        store.cancel();
    }
}
