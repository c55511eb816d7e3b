//! Observability module for correlation and tracing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::ActionKind;

/// Correlation ID tying together the log lines of one submission
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

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Trace context attached to one submission
///
/// Created when `submit()` passes its guards and carried in the `Waiting`
/// state, so the confirmation log lines share the submission's ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// Unique trace identifier for the whole submission
    pub trace_id: String,

    /// Identifier of this span
    pub span_id: String,

    pub correlation_id: CorrelationId,

    /// Operation name, e.g. `mint.submit`
    pub operation: String,

    pub started_at: DateTime<Utc>,
}

impl TraceContext {
    pub fn new(operation: &str) -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            span_id: Uuid::new_v4().to_string(),
            correlation_id: CorrelationId::new(),
            operation: operation.to_string(),
            started_at: Utc::now(),
        }
    }

    /// Context for a submission of `kind`
    pub fn for_submission(kind: ActionKind) -> Self {
        Self::new(&format!("{}.submit", kind))
    }

    /// Milliseconds since the context was created
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}
