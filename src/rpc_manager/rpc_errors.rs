use thiserror::Error;

/// RPC engine error types
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RpcManagerError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport {
        endpoint: String,
        message: String,
    },

    /// Timeout errors
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint}, method: {method})")]
    Timeout {
        endpoint: String,
        method: String,
        timeout_ms: u64,
    },

    /// JSON-RPC error object returned by the node
    #[error("RPC response error: {message} (method: {method}, code: {code})")]
    RpcResponse {
        method: String,
        message: String,
        code: i64,
    },

    /// Response could not be decoded into the expected type
    #[error("Failed to decode response of {method}: {reason}")]
    Decode { method: String, reason: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimitExceeded { endpoint: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RpcManagerError {
    /// Check if this error is retryable.
    ///
    /// The pipeline never retries on its own; this classification is exposed
    /// for callers that decide to re-issue a request.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcManagerError::Transport { .. } => true,
            RpcManagerError::Timeout { .. } => true,
            RpcManagerError::RateLimitExceeded { .. } => true,

            // JSON-RPC server errors are in the -32000..-32099 range
            RpcManagerError::RpcResponse { code, .. } => (-32099..=-32000).contains(code),

            RpcManagerError::Decode { .. } => false,
            RpcManagerError::Configuration(_) => false,
            RpcManagerError::Internal(_) => false,
        }
    }

    /// Get the endpoint associated with this error, if any
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            RpcManagerError::Transport { endpoint, .. } => Some(endpoint),
            RpcManagerError::Timeout { endpoint, .. } => Some(endpoint),
            RpcManagerError::RateLimitExceeded { endpoint } => Some(endpoint),
            _ => None,
        }
    }

    /// Classify a `reqwest` failure for the given endpoint and method
    pub fn from_reqwest_error(err: reqwest::Error, endpoint: &str, method: &str, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            return RpcManagerError::Timeout {
                endpoint: endpoint.to_string(),
                method: method.to_string(),
                timeout_ms,
            };
        }

        if err.status().map(|s| s.as_u16()) == Some(429) {
            return RpcManagerError::RateLimitExceeded {
                endpoint: endpoint.to_string(),
            };
        }

        if err.is_decode() {
            return RpcManagerError::Decode {
                method: method.to_string(),
                reason: err.to_string(),
            };
        }

        RpcManagerError::Transport {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        }
    }

    /// Convenience constructor for decode failures
    pub fn decode(method: impl Into<String>, reason: impl ToString) -> Self {
        RpcManagerError::Decode {
            method: method.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for RPC operations
pub type RpcResult<T> = Result<T, RpcManagerError>;
