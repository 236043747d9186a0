use super::compound::CompoundOperation;
use super::errors::{OperationError, OperationResult};
use super::operation::{AsOperationNode, OperationId, OperationNode};
use crate::config::QueueConfig;
use crate::metrics::metrics;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Bounded worker pool executing operation graphs.
///
/// Operations wait for their dependencies before taking a permit, so a
/// blocked dependent never occupies a worker slot. Cloning shares the pool.
#[derive(Clone)]
pub struct OperationQueue {
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    runtime: Handle,
}

impl std::fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationQueue")
            .field("max_concurrent", &self.max_concurrent)
            .field("available", &self.permits.available_permits())
            .finish()
    }
}

impl OperationQueue {
    /// Create a queue on the current Tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside of a Tokio runtime.
    pub fn new(max_concurrent: usize) -> Self {
        Self::with_handle(max_concurrent, Handle::current())
    }

    pub fn with_handle(max_concurrent: usize, runtime: Handle) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            runtime,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.max_concurrent_operations)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Stop handing out worker slots; waiting operations fail with `QueueClosed`
    pub fn close(&self) {
        self.permits.close();
    }

    /// Enqueue `nodes` together with their transitive dependencies.
    pub fn add_operations(&self, nodes: Vec<Arc<dyn OperationNode>>) -> OperationResult<()> {
        let prepared = self.prepare(nodes)?;
        self.enqueue(prepared);
        Ok(())
    }

    pub fn add_operation(&self, operation: &impl AsOperationNode) -> OperationResult<()> {
        self.add_operations(vec![operation.as_node()])
    }

    pub fn add_compound<T>(&self, wrapper: &CompoundOperation<T>) -> OperationResult<()>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.add_operations(wrapper.all_operations())
    }

    /// Collect the dependency closure of `nodes` and reject cyclic graphs
    pub(crate) fn prepare(
        &self,
        nodes: Vec<Arc<dyn OperationNode>>,
    ) -> OperationResult<Vec<Arc<dyn OperationNode>>> {
        let mut graph: DiGraph<OperationId, ()> = DiGraph::new();
        let mut index: HashMap<OperationId, NodeIndex> = HashMap::new();
        let mut collected: Vec<Arc<dyn OperationNode>> = Vec::new();
        let mut stack = nodes;

        while let Some(node) = stack.pop() {
            if index.contains_key(&node.id()) {
                continue;
            }
            index.insert(node.id(), graph.add_node(node.id()));

            if !node.status().is_terminal() {
                stack.extend(node.dependencies());
            }
            collected.push(node);
        }

        for node in &collected {
            let to = index[&node.id()];
            if node.status().is_terminal() {
                continue;
            }
            for dependency in node.dependencies() {
                if let Some(from) = index.get(&dependency.id()) {
                    graph.add_edge(*from, to, ());
                }
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            let id = graph[cycle.node_id()];
            let name = collected
                .iter()
                .find(|node| node.id() == id)
                .map(|node| node.name().to_string())
                .unwrap_or_else(|| id.to_string());
            warn!(operation = %name, "Rejecting cyclic operation graph");
            OperationError::CyclicDependency(name)
        })?;

        let mut by_id: HashMap<OperationId, Arc<dyn OperationNode>> =
            collected.into_iter().map(|node| (node.id(), node)).collect();

        Ok(order
            .into_iter()
            .filter_map(|ix| by_id.remove(&graph[ix]))
            .collect())
    }

    /// Spawn every prepared node that is neither finished nor already enqueued
    pub(crate) fn enqueue(&self, nodes: Vec<Arc<dyn OperationNode>>) {
        for node in nodes {
            if node.status().is_terminal() || !node.try_mark_enqueued() {
                continue;
            }

            debug!(operation = %node.name(), id = %node.id(), "Operation enqueued");
            metrics().operations_enqueued.inc();
            self.runtime.spawn(node.run(self.permits.clone()));
        }
    }
}
