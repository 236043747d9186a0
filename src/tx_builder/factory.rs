//! Batch construction pipeline for Substrate-style chains
//!
//! Graph built per request:
//!
//! ```text
//! coder ───────────────────┐
//! genesis ─────────────────┤
//! era ── era block hash ───┴── partial builders ── sender resolution ── nonce ── extrinsics
//!                                                        │
//!                                        sender resolver ┘
//! ```
//!
//! The coder, genesis hash and era resolve concurrently and are shared by
//! every transaction of the batch. The era block hash waits only for the era,
//! so its fetch overlaps the genesis fetch. Position `i` of the caller's index
//! list gets nonce `n + i`. Signing and encoding failures are reported per index;
//! failures before signing fail the whole batch.

use super::builder::{ExtrinsicBuilder, SignedExtension};
use super::context::SigningContext;
use super::era::{EraOperationFactory, EraResolution};
use super::errors::TransactionBuilderError;
use super::output::{ExtrinsicsCreationResult, SignedExtrinsic};
use super::sender::{ExtrinsicSenderResolution, SenderResolutionFactory};
use crate::metrics::metrics;
use crate::operation::{CompoundOperation, Operation, OperationError, OperationResult};
use crate::rpc_manager::{call_typed, methods, parse_quantity, RpcEngine, RpcManagerError};
use crate::runtime::{CoderFactory, RuntimeCodingService};
use crate::signer::SigningWrapper;
use crate::types::{BlockHash, BlockNumber, ChainModel, IndexedResult, Nonce};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-transaction customisation stage: `(builder, index) -> builder`
pub type ExtrinsicBuilderIndexedClosure =
    Arc<dyn Fn(ExtrinsicBuilder, usize) -> Result<ExtrinsicBuilder, TransactionBuilderError> + Send + Sync>;

/// Builders after sender resolution, aligned with the caller's indexes
#[derive(Debug, Clone)]
pub struct ResolvedBuilders {
    pub resolution: ExtrinsicSenderResolution,
    pub builders: Vec<ExtrinsicBuilder>,
}

/// Operation fetching the hash of block `number`, computed lazily
pub fn block_hash_operation<F>(engine: Arc<dyn RpcEngine>, name: &str, number: F) -> Operation<BlockHash>
where
    F: FnOnce() -> OperationResult<BlockNumber> + Send + 'static,
{
    Operation::new(name, move || async move {
        let number = number()?;
        fetch_block_hash(engine.as_ref(), number).await
    })
}

async fn fetch_block_hash(engine: &dyn RpcEngine, number: BlockNumber) -> OperationResult<BlockHash> {
    let hash: String = call_typed(engine, methods::CHAIN_GET_BLOCK_HASH, json!([number])).await?;
    let hash = BlockHash::from_hex(&hash)
        .map_err(|err| RpcManagerError::decode(methods::CHAIN_GET_BLOCK_HASH, err))?;
    Ok(hash)
}

pub struct ExtrinsicOperationFactory {
    chain: ChainModel,
    engine: Arc<dyn RpcEngine>,
    runtime: Arc<dyn RuntimeCodingService>,
    era_factory: Arc<dyn EraOperationFactory>,
    sender_factory: Arc<dyn SenderResolutionFactory>,
    custom_extensions: Vec<SignedExtension>,
}

impl ExtrinsicOperationFactory {
    pub fn new(
        chain: ChainModel,
        engine: Arc<dyn RpcEngine>,
        runtime: Arc<dyn RuntimeCodingService>,
        era_factory: Arc<dyn EraOperationFactory>,
        sender_factory: Arc<dyn SenderResolutionFactory>,
    ) -> Self {
        Self {
            chain,
            engine,
            runtime,
            era_factory,
            sender_factory,
            custom_extensions: Vec::new(),
        }
    }

    /// Extensions appended to every builder of this chain
    pub fn with_custom_extensions(mut self, extensions: Vec<SignedExtension>) -> Self {
        self.custom_extensions = extensions;
        self
    }

    pub fn chain(&self) -> &ChainModel {
        &self.chain
    }

    pub fn engine(&self) -> &Arc<dyn RpcEngine> {
        &self.engine
    }

    /// Build, sign and encode one extrinsic per entry of `indexes`
    pub fn create_extrinsics_operation(
        &self,
        closure: ExtrinsicBuilderIndexedClosure,
        indexes: Vec<usize>,
        signer: Arc<dyn SigningWrapper>,
    ) -> CompoundOperation<ExtrinsicsCreationResult> {
        let coder_op = self.runtime.fetch_coder_factory_operation();
        let genesis_op = block_hash_operation(self.engine.clone(), "genesis_hash", || Ok(0));
        let era_wrapper = self.era_factory.create_operation(self.engine.clone());
        let era_block_op = self.era_block_hash_operation(era_wrapper.target());

        let partial_op = self.partial_builders_operation(
            closure,
            indexes.clone(),
            &coder_op,
            &genesis_op,
            era_wrapper.target(),
            &era_block_op,
        );

        let sender_wrapper = self.sender_factory.create_wrapper();
        let resolution_op = {
            let partial = partial_op.clone();
            let resolver = sender_wrapper.target().clone();
            let coder = coder_op.clone();
            let op = Operation::closure("sender_resolution", move || {
                let builders = partial.extract_no_cancellable_result_data()?;
                let resolver = resolver.extract_no_cancellable_result_data()?;
                let coder = coder.extract_no_cancellable_result_data()?;
                let expected = builders.len();

                let (resolution, builders) = resolver.resolve_sender(builders, &coder)?;
                if builders.len() != expected {
                    return Err(TransactionBuilderError::internal(format!(
                        "sender resolution returned {} builders, expected {}",
                        builders.len(),
                        expected
                    ))
                    .into());
                }

                debug!(
                    account = %resolution.account.account_id,
                    delegated = resolution.is_delegated(),
                    "Sender resolved"
                );
                Ok(ResolvedBuilders {
                    resolution,
                    builders,
                })
            });
            op.add_dependency(&partial_op);
            op.add_dependency(sender_wrapper.target());
            op.add_dependency(&coder_op);
            op
        };

        let nonce_op = self.nonce_operation(&resolution_op);

        let extrinsics_op = {
            let resolved = resolution_op.clone();
            let nonce = nonce_op.clone();
            let coder = coder_op.clone();
            let op = Operation::closure("sign_extrinsics", move || {
                let resolved = resolved.extract_no_cancellable_result_data()?;
                let nonce = nonce.extract_no_cancellable_result_data()?;
                let coder = coder.extract_no_cancellable_result_data()?;
                Ok(sign_batch(resolved, &indexes, nonce, signer.as_ref(), &coder))
            });
            op.add_dependency(&resolution_op);
            op.add_dependency(&nonce_op);
            op.add_dependency(&coder_op);
            op
        };

        let mut dependencies = vec![coder_op.node(), genesis_op.node()];
        dependencies.extend(era_wrapper.all_operations());
        dependencies.push(era_block_op.node());
        dependencies.push(partial_op.node());
        dependencies.extend(sender_wrapper.all_operations());
        dependencies.push(resolution_op.node());
        dependencies.push(nonce_op.node());

        CompoundOperation::new(extrinsics_op, dependencies)
    }

    /// Single-transaction form of [`create_extrinsics_operation`](Self::create_extrinsics_operation)
    pub fn create_extrinsic_operation(
        &self,
        closure: ExtrinsicBuilderIndexedClosure,
        signer: Arc<dyn SigningWrapper>,
    ) -> CompoundOperation<SignedExtrinsic> {
        self.create_extrinsics_operation(closure, vec![0], signer)
            .map("extract_extrinsic", |result| {
                let first = result
                    .extrinsics
                    .into_iter()
                    .next()
                    .ok_or(OperationError::UnexpectedDependentResult)?;
                Ok(first.result?)
            })
    }

    /// Hash of the era birth block; `None` anchors the era at genesis.
    ///
    /// Depends only on the era so the mortal fetch overlaps the genesis fetch.
    fn era_block_hash_operation(&self, era_op: &Operation<EraResolution>) -> Operation<Option<BlockHash>> {
        let engine = self.engine.clone();
        let era = era_op.clone();

        let op = Operation::new("era_block_hash", move || async move {
            let resolution = era.extract_no_cancellable_result_data()?;
            if resolution.era.is_immortal() || resolution.block_number == 0 {
                return Ok(None);
            }

            fetch_block_hash(engine.as_ref(), resolution.block_number).await.map(Some)
        });
        op.add_dependency(era_op);
        op
    }

    fn partial_builders_operation(
        &self,
        closure: ExtrinsicBuilderIndexedClosure,
        indexes: Vec<usize>,
        coder_op: &Operation<Arc<CoderFactory>>,
        genesis_op: &Operation<BlockHash>,
        era_op: &Operation<EraResolution>,
        era_block_op: &Operation<Option<BlockHash>>,
    ) -> Operation<Vec<ExtrinsicBuilder>> {
        let coder = coder_op.clone();
        let genesis = genesis_op.clone();
        let era = era_op.clone();
        let era_block = era_block_op.clone();
        let default_tip = self.chain.default_tip;
        let extensions = self.custom_extensions.clone();

        let op = Operation::closure("partial_builders", move || {
            let coder = coder.extract_no_cancellable_result_data()?;
            let genesis = genesis.extract_no_cancellable_result_data()?;
            let era = era.extract_no_cancellable_result_data()?;
            let era_block = era_block.extract_no_cancellable_result_data()?.unwrap_or(genesis);

            indexes
                .iter()
                .map(|&index| {
                    let mut builder =
                        ExtrinsicBuilder::new(coder.spec_version, coder.transaction_version, genesis)
                            .with_era(era.era, era_block);
                    if let Some(tip) = default_tip {
                        builder = builder.with_tip(tip);
                    }
                    for extension in &extensions {
                        builder = builder.adding_extension(extension.clone());
                    }
                    closure(builder, index).map_err(OperationError::from)
                })
                .collect()
        });
        op.add_dependency(coder_op);
        op.add_dependency(genesis_op);
        op.add_dependency(era_op);
        op.add_dependency(era_block_op);
        op
    }

    fn nonce_operation(&self, resolution_op: &Operation<ResolvedBuilders>) -> Operation<Nonce> {
        let engine = self.engine.clone();
        let resolved = resolution_op.clone();

        let op = Operation::new("account_nonce", move || async move {
            let resolved = resolved.extract_no_cancellable_result_data()?;
            let address = resolved.resolution.account.account_id.to_hex();
            let value: Value = call_typed(
                engine.as_ref(),
                methods::SYSTEM_ACCOUNT_NEXT_INDEX,
                json!([address]),
            )
            .await?;

            let nonce = parse_quantity(methods::SYSTEM_ACCOUNT_NEXT_INDEX, &value)?;
            let nonce = Nonce::try_from(nonce)
                .map_err(|_| TransactionBuilderError::Nonce(format!("nonce {} out of range", nonce)))?;
            info!(account = %address, nonce = nonce, "Account nonce fetched");
            Ok(nonce)
        });
        op.add_dependency(resolution_op);
        op
    }
}

/// Assign nonces, sign and encode every builder; failures stay per index
pub fn sign_batch(
    resolved: ResolvedBuilders,
    indexes: &[usize],
    nonce: Nonce,
    signer: &dyn SigningWrapper,
    coder: &CoderFactory,
) -> ExtrinsicsCreationResult {
    let ResolvedBuilders {
        resolution,
        builders,
    } = resolved;
    let address = resolution.account.account_id.clone();
    let format = resolution.account.account_type.signature_payload_format();

    let extrinsics = indexes
        .iter()
        .zip(builders)
        .enumerate()
        .map(|(position, (&index, builder))| {
            let result = u32::try_from(position)
                .ok()
                .and_then(|offset| nonce.checked_add(offset))
                .ok_or_else(|| {
                    TransactionBuilderError::Nonce(format!(
                        "nonce overflow at position {} (base {})",
                        position, nonce
                    ))
                })
                .and_then(|nonce| {
                    let builder = builder
                        .with_nonce(nonce)
                        .with_address(address.clone())
                        .with_signature_payload_format(format);
                    let context = SigningContext::Substrate {
                        sender_resolution: resolution.clone(),
                        calls: builder.get_calls().to_vec(),
                    };
                    let data = builder.signing(signer, &context, coder)?.build(coder)?;
                    Ok(SignedExtrinsic { nonce, data })
                });

            match &result {
                Ok(_) => metrics().extrinsics_signed.inc(),
                Err(err) => {
                    metrics().signing_failures.inc();
                    metrics().record_builder_error(err.category());
                    warn!(index = index, error = %err, "Failed to sign extrinsic");
                }
            }

            IndexedResult::new(index, result)
        })
        .collect();

    ExtrinsicsCreationResult {
        extrinsics,
        sender: resolution,
    }
}
