//! Structured logging setup and pipeline event logger

use crate::config::LoggingConfig;
use crate::observability::CorrelationId;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Calling this twice
/// returns an error instead of replacing the first subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(config.with_target),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(config.with_target))
            .try_init()
    }
}

/// Structured logger for pipeline events of one request
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    correlation_id: CorrelationId,
}

impl StructuredLogger {
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self { correlation_id }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn log_batch_requested(&self, chain: &str, kind: &str, count: usize) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            chain = %chain,
            kind = %kind,
            count = %count,
            "Transaction batch requested"
        );
    }

    pub fn log_sender_resolved(&self, account: &str, delegated: bool) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            account = %account,
            delegated = %delegated,
            "Sender resolved"
        );
    }

    pub fn log_nonce_resolved(&self, account: &str, nonce: u64) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            account = %account,
            nonce = %nonce,
            "Nonce resolved"
        );
    }

    pub fn log_index_failed(&self, index: usize, error: &str) {
        tracing::warn!(
            correlation_id = %self.correlation_id,
            index = %index,
            error = %error,
            "Transaction failed for index"
        );
    }

    pub fn log_submitted(&self, index: usize, tx_hash: &str) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            index = %index,
            tx_hash = %tx_hash,
            "Transaction submitted"
        );
    }

    pub fn log_batch_finished(&self, succeeded: usize, failed: usize) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            succeeded = %succeeded,
            failed = %failed,
            "Transaction batch finished"
        );
    }
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new(CorrelationId::new())
    }
}
