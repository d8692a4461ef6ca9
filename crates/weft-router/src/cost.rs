//! Cost model and network latency estimation
//!
//! The cost of running a task on a candidate, in seconds, lower is better:
//!
//! ```text
//! cost = base_time * (1 + load) + active_jobs * per_job_wait + net_latency
//! base_time = (resource_hint / 100) * unit_time
//! ```
//!
//! `unit_time` is an order of magnitude smaller for accelerator-capable
//! nodes, modelling roughly 10x generation throughput. Ties are broken by
//! node name so selection is deterministic.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;
use weft_core::{RouterConfig, Task};
use weft_registry::NodeView;

/// Cache-backed network latency estimator.
///
/// Seeded with heuristics (same node, shared zone, fallback constant) and
/// overwritten by observed timings from dispatches and benchmarks.
/// Observations are last-write-wins; there is no decay.
#[derive(Debug, Clone)]
pub struct LatencyCache {
    observed: Arc<DashMap<(String, String), f64>>,
    zone_latency: f64,
    default_latency: f64,
}

impl LatencyCache {
    /// Create a cache from router configuration
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            observed: Arc::new(DashMap::new()),
            zone_latency: config.zone_latency,
            default_latency: config.default_latency,
        }
    }

    /// Estimated latency in seconds between `origin` and a candidate node
    pub fn estimate(&self, origin: &str, origin_zone: Option<&str>, node: &NodeView) -> f64 {
        if let Some(seconds) = self
            .observed
            .get(&(origin.to_string(), node.name.to_string()))
        {
            return *seconds;
        }

        if origin == node.name.as_str() {
            return 0.0;
        }

        match (origin_zone, node.zone()) {
            (Some(a), Some(b)) if a == b => self.zone_latency,
            _ => self.default_latency,
        }
    }

    /// Record a measured latency, replacing any previous estimate
    pub fn observe(&self, origin: &str, target: &str, seconds: f64) {
        debug!(origin, target, seconds, "Observed latency");
        self.observed
            .insert((origin.to_string(), target.to_string()), seconds);
    }
}

/// Deterministic candidate scoring
#[derive(Debug, Clone)]
pub struct CostModel {
    accel_unit_time: f64,
    cpu_unit_time: f64,
    per_job_wait: f64,
    latency: LatencyCache,
}

impl CostModel {
    /// Create a cost model from router configuration
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            accel_unit_time: config.accel_unit_time,
            cpu_unit_time: config.cpu_unit_time,
            per_job_wait: config.per_job_wait,
            latency: LatencyCache::new(config),
        }
    }

    /// The latency estimator backing this model
    pub fn latency(&self) -> &LatencyCache {
        &self.latency
    }

    /// Estimated cost in seconds of running `task` on `node`
    pub fn score(&self, task: &Task, origin_zone: Option<&str>, node: &NodeView) -> f64 {
        let unit_time = if node.capabilities.accelerated {
            self.accel_unit_time
        } else {
            self.cpu_unit_time
        };

        let base_time = (task.resource_hint as f64 / 100.0) * unit_time;
        let load_multiplier = 1.0 + f64::from(node.load.clamp(0.0, 1.0));
        let queue_wait = f64::from(node.active_jobs) * self.per_job_wait;
        let net_latency = self.latency.estimate(&task.origin, origin_zone, node);

        base_time * load_multiplier + queue_wait + net_latency
    }

    /// The minimum-cost candidate, ties broken by node name
    pub fn select<'a>(
        &self,
        task: &Task,
        origin_zone: Option<&str>,
        candidates: &'a [NodeView],
    ) -> Option<&'a NodeView> {
        candidates.iter().min_by(|a, b| {
            let ca = self.score(task, origin_zone, a);
            let cb = self.score(task, origin_zone, b);
            ca.partial_cmp(&cb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        })
    }
}
