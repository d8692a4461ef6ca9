//! # weft-router
//!
//! Cost-based routing and scheduling for weft.
//!
//! This crate provides:
//! - A deterministic multi-factor cost model over live candidates
//! - A cache-backed network latency estimator seeded with heuristics
//! - Per-node circuit breakers isolating failing nodes
//! - The dispatch client and candidate fallback loop
//! - Benchmark-driven latency calibration
//!
//! Dispatch is fire-and-forget: a task that exceeds its timeout is treated
//! as a node failure even if the node eventually completes it, and nothing
//! cancels work a node has already accepted. The router and the offline
//! queue's sync loop may retry the same task concurrently, so tasks must be
//! idempotent from the caller's perspective.

pub mod breaker;
pub mod client;
pub mod cost;
pub mod router;

// Re-export main types
pub use breaker::{BreakerBoard, BreakerState, CircuitBreaker};
pub use client::{HttpNodeClient, NodeClient};
pub use cost::{CostModel, LatencyCache};
pub use router::{BenchmarkReport, RouteOutcome, Router};
