//! Error types for the transaction construction pipeline
//!
//! Errors are `Clone` because a single failure can be observed by several
//! dependent operations, replayed from the fee cache, or stored per index in
//! an indexed batch result.

use crate::rpc_manager::RpcManagerError;
use thiserror::Error;

/// Error type for all transaction builder operations
///
/// Covers the whole construction lifecycle:
/// - Chain parameter and era resolution
/// - Sender resolution (including proxy delegation)
/// - Nonce assignment
/// - Signing and encoding
/// - Fee queries and submission responses
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionBuilderError {
    /// Nonce could not be resolved or assigned
    #[error("Nonce error: {0}")]
    Nonce(String),

    /// Era (lifetime window) could not be resolved
    #[error("Era resolution failed: {0}")]
    Era(String),

    /// No account is able to sign the requested calls
    ///
    /// Batch-fatal: no nonce is fetched and nothing is signed.
    #[error("Sender resolution failed: {0}")]
    SenderResolution(String),

    /// Failed to sign the transaction
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Failed to encode the transaction or its signing payload
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// A call is not known to the runtime metadata
    #[error("Invalid call {module}.{function}: {reason}")]
    InvalidCall {
        module: String,
        function: String,
        reason: String,
    },

    /// Builder is missing a required component
    #[error("Incomplete transaction: {0}")]
    Incomplete(String),

    /// Configuration or validation error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The request does not match the chain family of the service
    #[error("Unsupported request: {0}")]
    UnsupportedRequest(String),

    /// RPC failure scoped to a single transaction (fee query, submission)
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcManagerError),

    /// Internal invariant violation or unexpected state
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransactionBuilderError {
    /// Check if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Nonce(_) => true,
            Self::Era(_) => true,
            Self::Rpc(err) => err.is_retryable(),

            Self::SenderResolution(_) => false,
            Self::Signing(_) => false,
            Self::Encoding(_) => false,
            Self::InvalidCall { .. } => false,
            Self::Incomplete(_) => false,
            Self::Configuration(_) => false,
            Self::UnsupportedRequest(_) => false,
            Self::Internal(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Nonce(_) => "nonce",
            Self::Era(_) => "era",
            Self::SenderResolution(_) => "sender",
            Self::Signing(_) => "signing",
            Self::Encoding(_) => "encoding",
            Self::InvalidCall { .. } => "call",
            Self::Incomplete(_) => "incomplete",
            Self::Configuration(_) => "config",
            Self::UnsupportedRequest(_) => "unsupported",
            Self::Rpc(_) => "rpc",
            Self::Internal(_) => "internal",
        }
    }
}

// Convenience constructors for common error scenarios
impl TransactionBuilderError {
    pub fn invalid_call(
        module: impl Into<String>,
        function: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidCall {
            module: module.into(),
            function: function.into(),
            reason: reason.into(),
        }
    }

    pub fn signing(reason: impl ToString) -> Self {
        Self::Signing(reason.to_string())
    }

    pub fn encoding(reason: impl ToString) -> Self {
        Self::Encoding(reason.to_string())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}

impl From<bincode::Error> for TransactionBuilderError {
    fn from(err: bincode::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransactionBuilderError::Signing("key locked".to_string());
        assert_eq!(err.to_string(), "Signing failed: key locked");

        let err = TransactionBuilderError::invalid_call("Balances", "transfer_all", "not in metadata");
        assert_eq!(
            err.to_string(),
            "Invalid call Balances.transfer_all: not in metadata"
        );
    }

    #[test]
    fn test_error_retryability() {
        assert!(TransactionBuilderError::Nonce("test".to_string()).is_retryable());
        assert!(TransactionBuilderError::Rpc(RpcManagerError::Transport {
            endpoint: "ws".to_string(),
            message: "reset".to_string(),
        })
        .is_retryable());

        assert!(!TransactionBuilderError::Signing("test".to_string()).is_retryable());
        assert!(!TransactionBuilderError::SenderResolution("test".to_string()).is_retryable());
        assert!(!TransactionBuilderError::Internal("test".to_string()).is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(TransactionBuilderError::Era("x".to_string()).category(), "era");
        assert_eq!(TransactionBuilderError::signing("x").category(), "signing");
        assert_eq!(
            TransactionBuilderError::UnsupportedRequest("x".to_string()).category(),
            "unsupported"
        );
    }

    #[test]
    fn test_bincode_conversion() {
        let err: TransactionBuilderError =
            bincode::Error::new(bincode::ErrorKind::SizeLimit).into();
        assert!(matches!(err, TransactionBuilderError::Encoding(_)));
    }
}
