//! Error taxonomy for the broker layer.

use serde_json::{json, Value};
use thiserror::Error;

/// Errors surfaced to callers of the broker layer.
///
/// `Timeout` is only ever produced by the outgoing caller when its own
/// deadline elapses; the registry and consumers never construct it.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// The destination queue does not exist. This is the primary
    /// "invalid service name" signal and is never retried here.
    #[error("the service name is invalid or there are no service instances available")]
    QueueNotFound { queue_name: String },

    /// Transport or encoding failure with the underlying cause attached.
    #[error("unexpected broker failure: {0}")]
    Unexpected(String),

    /// The caller's deadline elapsed before a response arrived.
    #[error("timed out waiting for a response")]
    Timeout,
}

impl BrokerError {
    pub fn queue_not_found(queue_name: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue_name: queue_name.into(),
        }
    }

    pub fn unexpected(detail: impl Into<String>) -> Self {
        Self::Unexpected(detail.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::QueueNotFound { .. } => "queue_not_found",
            Self::Unexpected(_) => "unexpected",
            Self::Timeout => "timeout",
        }
    }

    fn metadata(&self) -> Value {
        match self {
            Self::QueueNotFound { queue_name } => json!({ "queue_name": queue_name }),
            Self::Unexpected(detail) => json!({ "trace": detail }),
            Self::Timeout => Value::Null,
        }
    }

    /// JSON representation used in HTTP error bodies.
    pub fn as_json(&self) -> Value {
        json!({
            "code": self.code(),
            "error": self.to_string(),
            "metadata": self.metadata(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_not_found_carries_queue_name_metadata() {
        let err = BrokerError::queue_not_found("req.no-such-service");
        assert_eq!(err.code(), "queue_not_found");
        let body = err.as_json();
        assert_eq!(body["metadata"]["queue_name"], "req.no-such-service");
        assert!(body["error"].as_str().unwrap().contains("invalid"));
    }

    #[test]
    fn unexpected_carries_cause_in_trace() {
        let err = BrokerError::unexpected("connection reset");
        let body = err.as_json();
        assert_eq!(body["code"], "unexpected");
        assert_eq!(body["metadata"]["trace"], "connection reset");
    }

    #[test]
    fn timeout_has_no_metadata() {
        let body = BrokerError::Timeout.as_json();
        assert_eq!(body["code"], "timeout");
        assert!(body["metadata"].is_null());
    }
}
