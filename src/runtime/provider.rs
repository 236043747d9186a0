use super::{CoderFactory, RuntimeCodingService, RuntimeMetadata};
use crate::operation::Operation;
use crate::rpc_manager::{call_typed, methods, RpcEngine};
use arc_swap::ArcSwapOption;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Runtime source with a fixed snapshot
#[derive(Debug, Clone)]
pub struct StaticRuntimeProvider {
    factory: Arc<CoderFactory>,
}

impl StaticRuntimeProvider {
    pub fn new(factory: CoderFactory) -> Self {
        Self {
            factory: Arc::new(factory),
        }
    }
}

impl RuntimeCodingService for StaticRuntimeProvider {
    fn fetch_coder_factory_operation(&self) -> Operation<Arc<CoderFactory>> {
        Operation::from_result("fetch_coder_factory", Ok(self.factory.clone()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeVersion {
    spec_version: u32,
    transaction_version: u32,
}

/// Runtime source reading versions from the node.
///
/// The first fetch queries `state_getRuntimeVersion`; later requests reuse
/// the cached snapshot until [`invalidate`](Self::invalidate) is called.
#[derive(Debug)]
pub struct RpcRuntimeProvider {
    engine: Arc<dyn RpcEngine>,
    metadata: Arc<RuntimeMetadata>,
    cached: Arc<ArcSwapOption<CoderFactory>>,
}

impl RpcRuntimeProvider {
    pub fn new(engine: Arc<dyn RpcEngine>, metadata: RuntimeMetadata) -> Self {
        Self {
            engine,
            metadata: Arc::new(metadata),
            cached: Arc::new(ArcSwapOption::empty()),
        }
    }

    /// Drop the cached snapshot, e.g. after a runtime upgrade
    pub fn invalidate(&self) {
        self.cached.store(None);
    }

    pub fn cached(&self) -> Option<Arc<CoderFactory>> {
        self.cached.load_full()
    }
}

impl RuntimeCodingService for RpcRuntimeProvider {
    fn fetch_coder_factory_operation(&self) -> Operation<Arc<CoderFactory>> {
        if let Some(factory) = self.cached.load_full() {
            return Operation::from_result("fetch_coder_factory", Ok(factory));
        }

        let engine = self.engine.clone();
        let metadata = self.metadata.clone();
        let cached = self.cached.clone();

        Operation::new("fetch_coder_factory", move || async move {
            let version: RuntimeVersion =
                call_typed(engine.as_ref(), methods::STATE_GET_RUNTIME_VERSION, json!([])).await?;

            info!(
                spec_version = version.spec_version,
                transaction_version = version.transaction_version,
                "Runtime version fetched"
            );

            let factory = Arc::new(CoderFactory {
                spec_version: version.spec_version,
                transaction_version: version.transaction_version,
                metadata,
            });
            cached.store(Some(factory.clone()));
            Ok(factory)
        })
    }
}
