//! Route orchestration: candidate selection, fallback, and queue handoff

use crate::breaker::BreakerBoard;
use crate::client::NodeClient;
use crate::cost::CostModel;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use weft_core::{DispatchReceipt, Error, NodeName, Result, RouterConfig, Task, TaskId};
use weft_queue::{QueueStore, ReplayDispatcher};
use weft_registry::{NodeView, Registry};

/// What a `route` call resolved to. Callers are never left ambiguous: the
/// task either executed, was durably queued, or the error propagated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RouteOutcome {
    /// The task executed on a node
    Executed(DispatchReceipt),
    /// No node could take the task; it is persisted for replay
    Queued { status: &'static str, task_id: TaskId },
}

impl RouteOutcome {
    fn queued(task_id: TaskId) -> Self {
        RouteOutcome::Queued {
            status: "queued",
            task_id,
        }
    }
}

/// Per-node results of a calibration pass; `None` marks a failed probe
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub results: HashMap<String, Option<f64>>,
}

/// The router: scores live candidates, dispatches with per-node failure
/// isolation, and hands undeliverable tasks to the offline queue.
pub struct Router {
    registry: Arc<dyn Registry>,
    queue: QueueStore,
    client: Arc<dyn NodeClient>,
    breakers: BreakerBoard,
    cost: CostModel,
    config: RouterConfig,
    /// Identity benchmark observations are recorded under
    origin: NodeName,
}

impl Router {
    /// Create a router over a registry, a durable queue, and a transport
    pub fn new(
        registry: Arc<dyn Registry>,
        queue: QueueStore,
        client: Arc<dyn NodeClient>,
        config: RouterConfig,
        origin: NodeName,
    ) -> Self {
        Self {
            registry,
            queue,
            breakers: BreakerBoard::new(&config),
            cost: CostModel::new(&config),
            client,
            config,
            origin,
        }
    }

    /// Route a task: dispatch to the best live node, falling back through
    /// remaining candidates, queueing durably when none can take it.
    ///
    /// Registry and queue-persistence failures propagate; they are never
    /// converted into a silent drop.
    pub async fn route(&self, task: Task) -> Result<RouteOutcome> {
        match self.attempt_dispatch(&task).await {
            Ok(receipt) => Ok(RouteOutcome::Executed(receipt)),
            Err(Error::NoHealthyNode(reason)) | Err(Error::AllNodesExhausted(reason)) => {
                info!(task = %task.id, reason = %reason, "Queueing task for offline replay");
                let id = task.id;
                self.queue
                    .enqueue(task, None)
                    .await
                    .map_err(weft_core::Error::from)?;
                Ok(RouteOutcome::queued(id))
            }
            Err(e) => Err(e),
        }
    }

    /// The shared dispatch path: select, dispatch, fall back. Does not
    /// touch the offline queue; `route` and the sync loop layer their own
    /// policies on top.
    async fn attempt_dispatch(&self, task: &Task) -> Result<DispatchReceipt> {
        let mut candidates = self.live_candidates().await?;
        if candidates.is_empty() {
            return Err(Error::no_healthy_node(
                "no active, non-open node in the registry",
            ));
        }

        let origin_zone = self.origin_zone(&task.origin).await;
        let mut last_error: Option<Error> = None;
        let mut attempts = 0u32;

        while !candidates.is_empty() && !self.config.fallback.exhausted(attempts) {
            let selected = match self.cost.select(task, origin_zone.as_deref(), &candidates) {
                Some(node) => node.clone(),
                None => break,
            };
            attempts += 1;

            match self.dispatch(&selected, task).await {
                Ok(receipt) => return Ok(receipt),
                Err(e) => {
                    warn!(
                        task = %task.id,
                        node = %selected.name,
                        error = %e,
                        remaining = self.config.fallback.remaining(attempts),
                        "Dispatch failed, trying next candidate"
                    );
                    last_error = Some(e);
                    candidates.retain(|n| n.name != selected.name);
                    if !self.config.fallback.interval.is_zero() {
                        tokio::time::sleep(self.config.fallback.interval).await;
                    }
                }
            }
        }

        Err(Error::exhausted(format!(
            "every candidate failed for task {} (last error: {})",
            task.id,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "none".to_string())
        )))
    }

    /// Send a task to one node and settle its breaker. Elapsed time feeds
    /// the latency estimator for future calibration.
    pub async fn dispatch(&self, node: &NodeView, task: &Task) -> Result<DispatchReceipt> {
        let origin_zone = self.origin_zone(&task.origin).await;
        let estimated = self.cost.score(task, origin_zone.as_deref(), node);
        let start = Instant::now();

        match self.client.execute(node, task).await {
            Ok(()) => {
                let actual = start.elapsed().as_secs_f64();
                self.breakers.on_success(&node.name);
                self.cost
                    .latency()
                    .observe(&task.origin, node.name.as_str(), actual);
                debug!(
                    task = %task.id,
                    node = %node.name,
                    estimated,
                    actual,
                    "Dispatch succeeded"
                );
                Ok(DispatchReceipt {
                    executed_on: node.name.clone(),
                    estimated_seconds: estimated,
                    actual_seconds: actual,
                })
            }
            Err(e) => {
                self.breakers.on_failure(&node.name, Utc::now());
                Err(e)
            }
        }
    }

    /// Timed health probe against every known node, refreshing the latency
    /// cache. Advisory traffic: failures are reported, breakers untouched.
    pub async fn benchmark(&self) -> Result<BenchmarkReport> {
        let nodes = self
            .registry
            .list_nodes()
            .await
            .map_err(weft_core::Error::from)?;

        let mut results = HashMap::new();
        for node in nodes {
            let start = Instant::now();
            match self.client.probe(node.address).await {
                Ok(()) => {
                    let seconds = start.elapsed().as_secs_f64();
                    self.cost
                        .latency()
                        .observe(self.origin.as_str(), node.name.as_str(), seconds);
                    results.insert(node.name.to_string(), Some(seconds));
                }
                Err(e) => {
                    warn!(node = %node.name, error = %e, "Benchmark probe failed");
                    results.insert(node.name.to_string(), None);
                }
            }
        }

        Ok(BenchmarkReport { results })
    }

    /// The per-node breakers (exposed for status surfaces)
    pub fn breakers(&self) -> &BreakerBoard {
        &self.breakers
    }

    /// Active nodes whose breakers admit a dispatch right now
    async fn live_candidates(&self) -> Result<Vec<NodeView>> {
        let now = Utc::now();
        let nodes = self
            .registry
            .list_nodes()
            .await
            .map_err(weft_core::Error::from)?;

        Ok(nodes
            .into_iter()
            .filter(|n| n.status.is_live() && self.breakers.admit(&n.name, now))
            .collect())
    }

    async fn origin_zone(&self, origin: &str) -> Option<String> {
        let name = NodeName::from(origin);
        match self.registry.get(&name).await {
            Ok(Some(view)) => view.zone().map(|z| z.to_string()),
            _ => None,
        }
    }
}

#[async_trait]
impl ReplayDispatcher for Router {
    async fn is_available(&self, target: Option<&NodeName>) -> bool {
        let candidate = match target {
            Some(name) => match self.registry.get(name).await {
                Ok(Some(view)) if view.status.is_live() => Some(view),
                _ => None,
            },
            None => match self.live_candidates().await {
                Ok(nodes) => nodes.into_iter().next(),
                Err(_) => None,
            },
        };

        match candidate {
            Some(view) => self.client.probe(view.address).await.is_ok(),
            None => false,
        }
    }

    async fn replay(&self, task: &Task) -> Result<DispatchReceipt> {
        self.attempt_dispatch(task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use rand::Rng;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use weft_core::{Capabilities, NodeDescriptor, NodeRole};
    use weft_registry::{NodeRegistry, RegistryError};

    /// Client whose per-node outcomes are scripted; records who executed.
    struct ScriptedClient {
        failing: DashMap<String, ()>,
        executions: DashMap<String, usize>,
        probes: AtomicUsize,
        probe_ok: bool,
    }

    impl ScriptedClient {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                failing: DashMap::new(),
                executions: DashMap::new(),
                probes: AtomicUsize::new(0),
                probe_ok: true,
            })
        }

        fn fail(&self, node: &str) {
            self.failing.insert(node.to_string(), ());
        }

        fn executed(&self, node: &str) -> usize {
            self.executions.get(node).map(|e| *e).unwrap_or(0)
        }
    }

    #[async_trait]
    impl NodeClient for ScriptedClient {
        async fn execute(&self, node: &NodeView, _task: &Task) -> Result<()> {
            if self.failing.contains_key(node.name.as_str()) {
                return Err(Error::network(format!("{} is scripted to fail", node.name)));
            }
            *self
                .executions
                .entry(node.name.to_string())
                .or_insert(0) += 1;
            Ok(())
        }

        async fn probe(&self, _address: SocketAddr) -> Result<()> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.probe_ok {
                Ok(())
            } else {
                Err(Error::network("probe scripted to fail"))
            }
        }
    }

    /// Registry whose storage is down
    struct BrokenRegistry;

    #[async_trait]
    impl Registry for BrokenRegistry {
        async fn register(
            &self,
            _descriptor: NodeDescriptor,
        ) -> weft_registry::Result<chrono::DateTime<Utc>> {
            Err(RegistryError::Unavailable("storage down".to_string()))
        }
        async fn heartbeat(
            &self,
            _name: &NodeName,
            _telemetry: Option<weft_registry::Heartbeat>,
        ) -> weft_registry::Result<chrono::DateTime<Utc>> {
            Err(RegistryError::Unavailable("storage down".to_string()))
        }
        async fn list_nodes(&self) -> weft_registry::Result<Vec<NodeView>> {
            Err(RegistryError::Unavailable("storage down".to_string()))
        }
        async fn get(&self, _name: &NodeName) -> weft_registry::Result<Option<NodeView>> {
            Err(RegistryError::Unavailable("storage down".to_string()))
        }
        async fn topology(&self) -> weft_registry::Result<weft_registry::TopologyView> {
            Err(RegistryError::Unavailable("storage down".to_string()))
        }
        async fn stats(&self) -> weft_registry::Result<weft_registry::RegistryStats> {
            Err(RegistryError::Unavailable("storage down".to_string()))
        }
    }

    async fn registry_with(nodes: &[(&str, bool)]) -> Arc<NodeRegistry> {
        let registry = Arc::new(NodeRegistry::new());
        for (i, (name, accelerated)) in nodes.iter().enumerate() {
            let caps = if *accelerated {
                Capabilities::accelerated(1, 24.0, 8, 64.0)
            } else {
                Capabilities::cpu_only(8, 64.0)
            };
            registry
                .register(NodeDescriptor::new(
                    *name,
                    NodeRole::Compute,
                    format!("127.0.0.1:{}", 9000 + i).parse().unwrap(),
                    caps,
                ))
                .await
                .unwrap();
        }
        registry
    }

    async fn router_with(
        registry: Arc<dyn Registry>,
        client: Arc<ScriptedClient>,
        dir: &TempDir,
    ) -> Router {
        let queue = QueueStore::open(dir.path()).await.unwrap();
        Router::new(
            registry,
            queue,
            client,
            RouterConfig::default(),
            NodeName::from("control"),
        )
    }

    #[tokio::test]
    async fn test_route_picks_cheapest_then_falls_back() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with(&[("slow-cpu", false), ("fast-accel", true)]).await;
        let client = ScriptedClient::new();
        // The cheaper candidate fails; the router must fall back.
        client.fail("fast-accel");
        let router = router_with(registry, client.clone(), &dir).await;

        let task = Task::new("origin", "m", "p").with_resource_hint(1000);
        let outcome = router.route(task).await.unwrap();

        match outcome {
            RouteOutcome::Executed(receipt) => {
                assert_eq!(receipt.executed_on.as_str(), "slow-cpu");
            }
            other => panic!("expected execution, got {:?}", other),
        }
        assert_eq!(client.executed("slow-cpu"), 1);
    }

    #[tokio::test]
    async fn test_zero_healthy_nodes_queues_exactly_once() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with(&[]).await;
        let client = ScriptedClient::new();
        let router = router_with(registry, client, &dir).await;

        let task = Task::new("origin", "m", "p");
        let id = task.id;
        let outcome = router.route(task).await.unwrap();

        assert_eq!(outcome, RouteOutcome::queued(id));
        let entries = router.queue.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].task.id, id);
    }

    #[tokio::test]
    async fn test_total_failure_queues_exactly_once() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with(&[("a", false), ("b", false)]).await;
        let client = ScriptedClient::new();
        client.fail("a");
        client.fail("b");
        let router = router_with(registry, client, &dir).await;

        let task = Task::new("origin", "m", "p");
        let outcome = router.route(task).await.unwrap();

        assert!(matches!(outcome, RouteOutcome::Queued { .. }));
        assert_eq!(router.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_open_breaker_excluded_from_selection() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with(&[("healthy", true), ("broken", true)]).await;
        let client = ScriptedClient::new();
        let router = router_with(registry, client.clone(), &dir).await;

        // Force "broken" open.
        let broken = NodeName::from("broken");
        let now = Utc::now();
        for _ in 0..3 {
            router.breakers().on_failure(&broken, now);
        }

        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let task = Task::new("origin", "m", "p")
                .with_resource_hint(rng.gen_range(1..5000))
                .with_priority(rng.gen_range(0..10));
            router.route(task).await.unwrap();
        }

        assert_eq!(client.executed("broken"), 0);
        assert_eq!(client.executed("healthy"), 1000);
    }

    #[tokio::test]
    async fn test_registry_failure_propagates_without_queueing() {
        let dir = TempDir::new().unwrap();
        let client = ScriptedClient::new();
        let router = router_with(Arc::new(BrokenRegistry), client, &dir).await;

        let err = router.route(Task::new("origin", "m", "p")).await.unwrap_err();
        assert!(matches!(err, Error::RegistryUnavailable(_)));
        assert!(router.queue.is_empty());
    }

    #[tokio::test]
    async fn test_replay_does_not_enqueue() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with(&[("a", false)]).await;
        let client = ScriptedClient::new();
        client.fail("a");
        let router = router_with(registry, client, &dir).await;

        let task = Task::new("origin", "m", "p");
        let err = router.replay(&task).await.unwrap_err();
        assert!(matches!(err, Error::AllNodesExhausted(_)));
        assert!(router.queue.is_empty());
    }

    #[tokio::test]
    async fn test_is_available_without_nodes() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with(&[]).await;
        let client = ScriptedClient::new();
        let router = router_with(registry, client, &dir).await;

        assert!(!router.is_available(None).await);
        assert!(!router.is_available(Some(&NodeName::from("ghost"))).await);
    }

    #[tokio::test]
    async fn test_is_available_probes_live_target() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with(&[("aurora", false)]).await;
        let client = ScriptedClient::new();
        let router = router_with(registry, client.clone(), &dir).await;

        assert!(router.is_available(Some(&NodeName::from("aurora"))).await);
        assert!(router.is_available(None).await);
        assert_eq!(client.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_benchmark_records_latency_and_spares_breakers() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with(&[("a", false), ("b", false)]).await;
        let client = ScriptedClient::new();
        let router = router_with(registry, client, &dir).await;

        let report = router.benchmark().await.unwrap();
        assert_eq!(report.results.len(), 2);
        assert!(report.results.values().all(|r| r.is_some()));
        assert_eq!(
            router.breakers().state(&NodeName::from("a")),
            crate::BreakerState::Closed
        );
    }

    #[tokio::test]
    async fn test_dispatch_success_resets_breaker() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with(&[("a", false)]).await;
        let client = ScriptedClient::new();
        let router = router_with(registry.clone(), client.clone(), &dir).await;

        let name = NodeName::from("a");
        router.breakers().on_failure(&name, Utc::now());
        router.breakers().on_failure(&name, Utc::now());

        router.route(Task::new("origin", "m", "p")).await.unwrap();

        // A later pair of failures must not cross the threshold.
        router.breakers().on_failure(&name, Utc::now());
        router.breakers().on_failure(&name, Utc::now());
        assert_eq!(router.breakers().state(&name), crate::BreakerState::Closed);
    }
}
