//! Correlation of pipeline requests across operations and log lines

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier shared by every log line of one fee or submit request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Trace context of a pipeline request.
///
/// A batch gets a root context; its fee query and submission stages derive
/// child contexts that keep the batch id and correlation id and point back
/// at the stage that spawned them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceContext {
    pub batch_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub correlation_id: CorrelationId,
    pub stage: String,
    pub chain_id: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl TraceContext {
    pub fn new(stage: &str) -> Self {
        Self {
            batch_id: Uuid::new_v4().to_string(),
            span_id: Uuid::new_v4().to_string(),
            parent_span_id: None,
            correlation_id: CorrelationId::new(),
            stage: stage.to_string(),
            chain_id: None,
            started_at: chrono::Utc::now(),
        }
    }

    pub fn for_chain(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = Some(chain_id.into());
        self
    }

    pub fn child_span(&self, stage: &str) -> Self {
        Self {
            batch_id: self.batch_id.clone(),
            span_id: Uuid::new_v4().to_string(),
            parent_span_id: Some(self.span_id.clone()),
            correlation_id: self.correlation_id.clone(),
            stage: stage.to_string(),
            chain_id: self.chain_id.clone(),
            started_at: chrono::Utc::now(),
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// `tracing` span carrying the context fields
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "txflow",
            stage = %self.stage,
            batch_id = %self.batch_id,
            correlation_id = %self.correlation_id,
            chain = self.chain_id.as_deref().unwrap_or("-"),
        )
    }

    pub fn elapsed_ms(&self) -> i64 {
        (chrono::Utc::now() - self.started_at).num_milliseconds()
    }
}
