//! # weft-agent
//!
//! The weft control-plane daemon.
//!
//! Wires the node registry, the router, and the durable offline queue into
//! one process and exposes them over a REST surface. The `weftd` binary is
//! a thin shell around this crate.

use thiserror::Error;

pub mod handlers;
pub mod server;

// Re-export main types
pub use server::{AppState, HttpServer};

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur while running the agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Core error: {0}")]
    Core(#[from] weft_core::Error),
}
