//! Asynchronous task-composition engine
//!
//! Operations form a dependency DAG. A [`CompoundOperation`] groups a target
//! with everything it needs, the [`OperationQueue`] runs the graph on a
//! bounded worker pool, and [`execute`] / [`execute_cancellable`] deliver the
//! target's single result on a [`CallbackQueue`].

pub mod call_store;
pub mod compound;
pub mod errors;
pub mod execute;
#[allow(clippy::module_inception)]
pub mod operation;
pub mod queue;

pub use call_store::{Cancellable, CancellableCallStore};
pub use compound::CompoundOperation;
pub use errors::{OperationError, OperationResult};
pub use execute::{execute, execute_cancellable, CallbackQueue, CallbackReceiver};
pub use operation::{AsOperationNode, Operation, OperationId, OperationNode, OperationStatus};
pub use queue::OperationQueue;
