//! Error handling for weft
//!
//! Provides a unified error type and result type for use across all weft
//! components. Per-node dispatch failures are recovered locally by the
//! router; the variants here are what callers ultimately observe.

/// Result type alias for weft operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for weft
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),

    /// Invalid request or parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The registry has entries but none are active and non-open
    #[error("No healthy node available: {0}")]
    NoHealthyNode(String),

    /// Every live candidate failed dispatch for this task
    #[error("All candidate nodes exhausted: {0}")]
    AllNodesExhausted(String),

    /// A node accepted a task but did not respond within the deadline
    #[error("Dispatch timed out: {0}")]
    DispatchTimeout(String),

    /// Registry storage failure, fatal for the calling request
    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// Durable queue store read/write failure
    #[error("Queue persistence error: {0}")]
    QueuePersistence(String),

    /// A queue entry was dropped after exhausting its retries
    #[error("Max retries exceeded: {0}")]
    MaxRetriesExceeded(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a no-healthy-node error
    pub fn no_healthy_node(msg: impl Into<String>) -> Self {
        Self::NoHealthyNode(msg.into())
    }

    /// Create an all-nodes-exhausted error
    pub fn exhausted(msg: impl Into<String>) -> Self {
        Self::AllNodesExhausted(msg.into())
    }

    /// Create a dispatch timeout error
    pub fn dispatch_timeout(msg: impl Into<String>) -> Self {
        Self::DispatchTimeout(msg.into())
    }

    /// Create a registry unavailable error
    pub fn registry_unavailable(msg: impl Into<String>) -> Self {
        Self::RegistryUnavailable(msg.into())
    }

    /// Create a queue persistence error
    pub fn queue_persistence(msg: impl Into<String>) -> Self {
        Self::QueuePersistence(msg.into())
    }

    /// Create a max-retries-exceeded error
    pub fn max_retries(msg: impl Into<String>) -> Self {
        Self::MaxRetriesExceeded(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is retryable from a dispatch perspective
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_)
                | Error::DispatchTimeout(_)
                | Error::NoHealthyNode(_)
                | Error::AllNodesExhausted(_)
                | Error::Internal(_)
        )
    }

    /// Get the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::InvalidConfiguration(_) => "configuration",
            Error::InvalidRequest(_) => "invalid_request",
            Error::NotFound(_) => "not_found",
            Error::NoHealthyNode(_) => "no_healthy_node",
            Error::AllNodesExhausted(_) => "all_nodes_exhausted",
            Error::DispatchTimeout(_) => "dispatch_timeout",
            Error::RegistryUnavailable(_) => "registry_unavailable",
            Error::QueuePersistence(_) => "queue_persistence",
            Error::MaxRetriesExceeded(_) => "max_retries_exceeded",
            Error::Network(_) => "network",
            Error::Internal(_) => "internal",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Other(_) => "other",
        }
    }

    /// Convert to HTTP status code (used by the agent's REST surface)
    pub fn to_http_status(&self) -> u16 {
        match self {
            Error::InvalidConfiguration(_) | Error::InvalidRequest(_) | Error::Json(_) => 400,
            Error::NotFound(_) => 404,
            Error::DispatchTimeout(_) => 504,
            Error::NoHealthyNode(_) | Error::AllNodesExhausted(_) => 503,
            Error::RegistryUnavailable(_) | Error::QueuePersistence(_) => 503,
            Error::Network(_) => 502,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::no_healthy_node("registry empty of active nodes");
        assert!(matches!(err, Error::NoHealthyNode(_)));
        assert_eq!(
            err.to_string(),
            "No healthy node available: registry empty of active nodes"
        );
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::config("test").category(), "configuration");
        assert_eq!(Error::exhausted("test").category(), "all_nodes_exhausted");
        assert_eq!(Error::queue_persistence("test").category(), "queue_persistence");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::dispatch_timeout("slow node").is_retryable());
        assert!(Error::network("refused").is_retryable());
        assert!(!Error::invalid_request("bad params").is_retryable());
        assert!(!Error::queue_persistence("disk full").is_retryable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(Error::invalid_request("test").to_http_status(), 400);
        assert_eq!(Error::not_found("test").to_http_status(), 404);
        assert_eq!(Error::dispatch_timeout("test").to_http_status(), 504);
        assert_eq!(Error::no_healthy_node("test").to_http_status(), 503);
        assert_eq!(Error::internal("test").to_http_status(), 500);
    }
}
