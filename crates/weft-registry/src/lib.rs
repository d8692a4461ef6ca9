//! # weft-registry
//!
//! Soft-state node registry for weft.
//!
//! This crate provides:
//! - Node descriptor storage with per-key atomic upsert
//! - Liveness classification evaluated on read (no external TTL store)
//! - Registration events on a broadcast channel
//! - Topology and aggregate statistics queries
//!
//! Registry entries are rebuildable from heartbeats and are never treated
//! as a source of strong consistency.

use thiserror::Error;

pub mod registry;
pub mod topology;

// Re-export commonly used types
pub use registry::{Heartbeat, NodeRegistry, NodeView, Registry, RegistryEvent, RegistryStats};
pub use topology::{Connection, EdgeKind, TopologyView};

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur during registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Storage-level failure; fatal for the calling request and distinct
    /// from the registry simply having no live nodes.
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Core error: {0}")]
    Core(#[from] weft_core::Error),
}

impl From<RegistryError> for weft_core::Error {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Unavailable(msg) => weft_core::Error::RegistryUnavailable(msg),
            RegistryError::InvalidDescriptor(msg) => weft_core::Error::InvalidRequest(msg),
            RegistryError::Core(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_maps_to_core_taxonomy() {
        let err: weft_core::Error = RegistryError::Unavailable("map full".to_string()).into();
        assert_eq!(err.category(), "registry_unavailable");
        assert_eq!(err.to_http_status(), 503);
    }
}
