//! Transaction lifetime window ("era") and the policies resolving it

use super::errors::TransactionBuilderError;
use crate::operation::{CompoundOperation, Operation};
use crate::rpc_manager::{methods, parse_quantity, rpc_operation, RpcEngine};
use crate::types::BlockNumber;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

const MIN_PERIOD: u64 = 4;
const MAX_PERIOD: u64 = 1 << 16;

/// Validity window of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Era {
    Immortal,
    Mortal { period: u64, phase: u64 },
}

impl Era {
    /// Mortal era of roughly `period` blocks starting around `current`.
    ///
    /// The period is rounded up to a power of two in `[4, 65536]` and the
    /// phase quantised so the era fits the two-byte encoding.
    pub fn mortal(period: u64, current: u64) -> Self {
        let period = period
            .checked_next_power_of_two()
            .unwrap_or(MAX_PERIOD)
            .clamp(MIN_PERIOD, MAX_PERIOD);
        let phase = current % period;
        let quantize_factor = (period >> 12).max(1);
        let quantized_phase = phase / quantize_factor * quantize_factor;

        Era::Mortal {
            period,
            phase: quantized_phase,
        }
    }

    pub fn is_immortal(&self) -> bool {
        matches!(self, Era::Immortal)
    }

    /// First block of the window containing `current`
    pub fn birth(&self, current: u64) -> u64 {
        match *self {
            Era::Immortal => 0,
            Era::Mortal { period, phase } => (current.max(phase) - phase) / period * period + phase,
        }
    }

    /// First block at which the transaction is no longer valid
    pub fn death(&self, current: u64) -> u64 {
        match *self {
            Era::Immortal => u64::MAX,
            Era::Mortal { period, .. } => self.birth(current) + period,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Era::Immortal => vec![0],
            Era::Mortal { period, phase } => {
                let quantize_factor = (period >> 12).max(1);
                let trailing_zeros = period.trailing_zeros() as u64;
                let encoded = (trailing_zeros.saturating_sub(1)).clamp(1, 15)
                    | ((phase / quantize_factor) << 4);
                (encoded as u16).to_le_bytes().to_vec()
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TransactionBuilderError> {
        match bytes {
            [0] => Ok(Era::Immortal),
            [low, high] => {
                let encoded = u16::from_le_bytes([*low, *high]) as u64;
                let period = 2u64 << (encoded % (1 << 4));
                let quantize_factor = (period >> 12).max(1);
                let phase = (encoded >> 4) * quantize_factor;

                if period >= MIN_PERIOD && phase < period {
                    Ok(Era::Mortal { period, phase })
                } else {
                    Err(TransactionBuilderError::Era(format!(
                        "invalid mortal era encoding {:#06x}",
                        encoded
                    )))
                }
            }
            other => Err(TransactionBuilderError::Era(format!(
                "invalid era length {}",
                other.len()
            ))),
        }
    }
}

/// Era together with the block the window is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraResolution {
    pub era: Era,
    pub block_number: BlockNumber,
}

impl EraResolution {
    pub fn immortal() -> Self {
        Self {
            era: Era::Immortal,
            block_number: 0,
        }
    }
}

/// Policy deciding the lifetime window of transactions
pub trait EraOperationFactory: Send + Sync {
    fn create_operation(&self, engine: Arc<dyn RpcEngine>) -> CompoundOperation<EraResolution>;
}

/// Transactions never expire
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmortalEraOperationFactory;

impl EraOperationFactory for ImmortalEraOperationFactory {
    fn create_operation(&self, _engine: Arc<dyn RpcEngine>) -> CompoundOperation<EraResolution> {
        CompoundOperation::from_result("immortal_era", Ok(EraResolution::immortal()))
    }
}

/// Mortal era anchored at the last finalized block
#[derive(Debug, Clone, Copy)]
pub struct MortalEraOperationFactory {
    pub period: u64,
}

impl MortalEraOperationFactory {
    pub fn new(period: u64) -> Self {
        Self { period }
    }
}

impl Default for MortalEraOperationFactory {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EraOperationFactory for MortalEraOperationFactory {
    fn create_operation(&self, engine: Arc<dyn RpcEngine>) -> CompoundOperation<EraResolution> {
        let head_op: Operation<String> =
            rpc_operation(engine.clone(), methods::CHAIN_GET_FINALIZED_HEAD, || Ok(json!([])));

        let head = head_op.clone();
        let header_op: Operation<Value> = rpc_operation(engine, methods::CHAIN_GET_HEADER, move || {
            Ok(json!([head.extract_no_cancellable_result_data()?]))
        });
        header_op.add_dependency(&head_op);

        let period = self.period;
        let header = header_op.clone();
        let era_op = Operation::closure("mortal_era", move || {
            let header = header.extract_no_cancellable_result_data()?;
            let number = header
                .get("number")
                .ok_or_else(|| TransactionBuilderError::Era("header without number".to_string()))
                .and_then(|number| {
                    parse_quantity(methods::CHAIN_GET_HEADER, number).map_err(TransactionBuilderError::from)
                })?;

            let number = u64::try_from(number)
                .map_err(|_| TransactionBuilderError::Era(format!("block number {} out of range", number)))?;
            let era = Era::mortal(period, number);
            let block_number = BlockNumber::try_from(era.birth(number)).map_err(|_| {
                TransactionBuilderError::Era(format!("era birth of block {} out of range", number))
            })?;

            Ok(EraResolution { era, block_number })
        });
        era_op.add_dependency(&header_op);

        CompoundOperation::new(era_op, vec![head_op.node(), header_op.node()])
    }
}
