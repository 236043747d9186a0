use crate::rpc_manager::RpcManagerError;
use crate::tx_builder::TransactionBuilderError;
use thiserror::Error;

/// Errors surfaced by operations and the scheduler
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OperationError {
    /// A required upstream operation produced no usable value.
    ///
    /// Indicates a wiring defect, never expected in normal operation.
    #[error("Unexpected dependent result")]
    UnexpectedDependentResult,

    /// The operation was cancelled before it finished
    #[error("Operation cancelled")]
    Cancelled,

    /// The submitted graph contains a dependency cycle
    #[error("Cyclic dependency detected involving operation '{0}'")]
    CyclicDependency(String),

    /// The worker pool was shut down while the operation waited for a slot
    #[error("Operation queue closed")]
    QueueClosed,

    #[error(transparent)]
    Rpc(#[from] RpcManagerError),

    #[error(transparent)]
    Builder(#[from] TransactionBuilderError),
}

impl OperationError {
    /// True when the error comes from a network step the caller may re-issue
    pub fn is_retryable(&self) -> bool {
        match self {
            OperationError::Rpc(err) => err.is_retryable(),
            OperationError::Builder(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Label used for the failed-operations metric
    pub fn category(&self) -> &'static str {
        match self {
            OperationError::UnexpectedDependentResult => "dependency",
            OperationError::Cancelled => "cancelled",
            OperationError::CyclicDependency(_) => "cycle",
            OperationError::QueueClosed => "queue",
            OperationError::Rpc(_) => "rpc",
            OperationError::Builder(err) => err.category(),
        }
    }
}

impl From<OperationError> for TransactionBuilderError {
    fn from(err: OperationError) -> Self {
        match err {
            OperationError::Builder(err) => err,
            OperationError::Rpc(err) => TransactionBuilderError::Rpc(err),
            other => TransactionBuilderError::Internal(other.to_string()),
        }
    }
}

/// Result type produced by every operation
pub type OperationResult<T> = Result<T, OperationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparent_display() {
        let err = OperationError::from(TransactionBuilderError::Signing("no key".to_string()));
        assert_eq!(err.to_string(), "Signing failed: no key");
        assert_eq!(err.category(), "signing");
    }

    #[test]
    fn test_builder_round_trip() {
        let inner = TransactionBuilderError::Nonce("overflow".to_string());
        let back: TransactionBuilderError = OperationError::Builder(inner.clone()).into();
        assert_eq!(back, inner);

        let back: TransactionBuilderError = OperationError::Cancelled.into();
        assert!(matches!(back, TransactionBuilderError::Internal(_)));
    }

    #[test]
    fn test_engine_errors_not_retryable() {
        assert!(!OperationError::UnexpectedDependentResult.is_retryable());
        assert!(!OperationError::CyclicDependency("a".to_string()).is_retryable());
        assert!(OperationError::Rpc(RpcManagerError::Transport {
            endpoint: "http://localhost".to_string(),
            message: "refused".to_string(),
        })
        .is_retryable());
    }
}
