//! # weft-core
//!
//! Core types, traits, and utilities for weft - a control plane for a
//! heterogeneous pool of inference-capable compute nodes.
//!
//! This crate provides the foundational data structures and interfaces that
//! are shared across all other weft components. It includes:
//!
//! - Core data structures for nodes, capabilities, and tasks
//! - Liveness classification as a pure function of heartbeat age
//! - The unified error taxonomy for routing and queueing
//! - Configuration schema and validation
//! - The shared retry-policy abstraction

pub mod config;
pub mod error;
pub mod retry;
pub mod task;
pub mod types;

// Re-export commonly used types at the crate root
pub use config::{QueueConfig, RegistryConfig, RouterConfig, ServerConfig, WeftConfig};
pub use error::{Error, Result};
pub use retry::RetryPolicy;
pub use task::{DispatchReceipt, Task, TaskId};
pub use types::{Capabilities, NodeDescriptor, NodeName, NodeRole, NodeStatus};
