use super::errors::OperationResult;
use super::operation::{AsOperationNode, Operation, OperationId, OperationNode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A target operation together with every operation needed to produce it.
///
/// `dependencies` never contains the target; [`all_operations`] returns the
/// target last so the graph can be handed to a queue as-is.
///
/// [`all_operations`]: CompoundOperation::all_operations
pub struct CompoundOperation<T> {
    target: Operation<T>,
    dependencies: Vec<Arc<dyn OperationNode>>,
    cancelled: Arc<AtomicBool>,
}

impl<T> Clone for CompoundOperation<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            dependencies: self.dependencies.clone(),
            cancelled: self.cancelled.clone(),
        }
    }
}

impl<T> std::fmt::Debug for CompoundOperation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompoundOperation")
            .field("target", &self.target)
            .field("dependencies", &self.dependencies.len())
            .finish()
    }
}

impl<T> CompoundOperation<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(target: Operation<T>, dependencies: Vec<Arc<dyn OperationNode>>) -> Self {
        let target_id = target.id();
        let mut unique: Vec<Arc<dyn OperationNode>> = Vec::with_capacity(dependencies.len());
        for node in dependencies {
            if node.id() != target_id && !unique.iter().any(|n| n.id() == node.id()) {
                unique.push(node);
            }
        }

        Self {
            target,
            dependencies: unique,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_operation(target: Operation<T>) -> Self {
        Self::new(target, Vec::new())
    }

    /// Graph whose target is already finished with `result`
    pub fn from_result(name: impl Into<String>, result: OperationResult<T>) -> Self {
        Self::from_operation(Operation::from_result(name, result))
    }

    pub fn target(&self) -> &Operation<T> {
        &self.target
    }

    pub fn id(&self) -> OperationId {
        self.target.id()
    }

    pub fn dependencies(&self) -> &[Arc<dyn OperationNode>] {
        &self.dependencies
    }

    pub fn all_operations(&self) -> Vec<Arc<dyn OperationNode>> {
        let mut all = self.dependencies.clone();
        all.push(self.target.node());
        all
    }

    /// Make every operation of this graph depend on `node`.
    pub fn add_dependency(&self, node: &impl AsOperationNode) {
        let node = node.as_node();
        for op in self.all_operations() {
            op.add_dependency_node(node.clone());
        }
    }

    /// Make every operation of this graph depend on every node in `nodes`
    pub fn add_dependencies(&self, nodes: &[Arc<dyn OperationNode>]) {
        for node in nodes {
            self.add_dependency(node);
        }
    }

    /// Put `head` in front of the graph: every current operation waits for it.
    pub fn insert_head<U>(mut self, head: CompoundOperation<U>) -> Self
    where
        U: Clone + Send + Sync + 'static,
    {
        self.add_dependency(head.target());
        let mut dependencies = head.all_operations();
        dependencies.append(&mut self.dependencies);
        Self::new(self.target, dependencies)
    }

    /// Derive a new target computed from this graph's result.
    pub fn map<U, F>(self, name: impl Into<String>, f: F) -> CompoundOperation<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> OperationResult<U> + Send + 'static,
    {
        let source = self.target.clone();
        let mapped = Operation::closure(name, move || {
            let value = source.extract_no_cancellable_result_data()?;
            f(value)
        });
        mapped.add_dependency(&self.target);

        CompoundOperation::new(mapped, self.all_operations())
    }

    /// Cancel every operation of the graph and suppress its callbacks
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.target.cancel();
        for op in &self.dependencies {
            op.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.target.is_cancelled()
    }
}

impl<T> AsOperationNode for CompoundOperation<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn as_node(&self) -> Arc<dyn OperationNode> {
        self.target.node()
    }
}
