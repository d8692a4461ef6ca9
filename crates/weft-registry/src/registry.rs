//! Node storage, heartbeats, and liveness classification

use crate::topology::{self, TopologyView};
use crate::{RegistryError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use weft_core::{Capabilities, NodeDescriptor, NodeName, NodeRole, NodeStatus, RegistryConfig};

/// Narrow interface the rest of the control plane sees.
///
/// A node only ever mutates its own record, so implementations can rely on
/// per-key upsert instead of a coarse map-wide lock.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Idempotent upsert of a node's descriptor; refreshes liveness.
    async fn register(&self, descriptor: NodeDescriptor) -> Result<DateTime<Utc>>;

    /// Refresh a node's liveness record. Unknown nodes are logged, not fatal.
    async fn heartbeat(&self, name: &NodeName, telemetry: Option<Heartbeat>)
        -> Result<DateTime<Utc>>;

    /// Every known node merged with its computed status. Stale entries are
    /// never excluded; callers filter as needed.
    async fn list_nodes(&self) -> Result<Vec<NodeView>>;

    /// Look up a single node
    async fn get(&self, name: &NodeName) -> Result<Option<NodeView>>;

    /// Nodes plus mesh/replication/inference edges
    async fn topology(&self) -> Result<TopologyView>;

    /// Aggregate counts for observability
    async fn stats(&self) -> Result<RegistryStats>;
}

/// Telemetry a node may piggyback on a heartbeat
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Current load fraction in [0, 1]
    pub load: Option<f32>,

    /// Number of jobs currently executing on the node
    pub active_jobs: Option<u32>,
}

/// A node merged with its computed liveness, as returned by queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeView {
    pub name: NodeName,
    pub role: NodeRole,
    pub address: std::net::SocketAddr,
    pub capabilities: Capabilities,
    pub metadata: HashMap<String, String>,
    pub status: NodeStatus,
    pub last_seen: DateTime<Utc>,
    pub load: f32,
    pub active_jobs: u32,
}

impl NodeView {
    /// The network zone this node declared, if any
    pub fn zone(&self) -> Option<&str> {
        self.metadata.get("zone").map(|s| s.as_str())
    }
}

/// Aggregate registry statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_nodes: usize,
    pub active_nodes: usize,
    pub warning_nodes: usize,
    pub offline_nodes: usize,
    pub nodes_by_role: HashMap<String, usize>,
    pub total_accelerators: u32,
    pub total_accelerator_memory_gb: f32,
}

/// Events published on the registry's broadcast channel
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A node registered or re-registered
    Registered { name: NodeName, role: NodeRole },
}

/// Internal per-node record. Soft state: never hard-deleted, rebuilt from
/// heartbeats after a restart.
#[derive(Debug, Clone)]
struct NodeRecord {
    descriptor: NodeDescriptor,
    registered_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    load: f32,
    active_jobs: u32,
}

impl NodeRecord {
    fn view(&self, now: DateTime<Utc>, config: &RegistryConfig) -> NodeView {
        let elapsed = (now - self.last_seen)
            .to_std()
            .unwrap_or_default();
        NodeView {
            name: self.descriptor.name.clone(),
            role: self.descriptor.role,
            address: self.descriptor.address,
            capabilities: self.descriptor.capabilities.clone(),
            metadata: self.descriptor.metadata.clone(),
            status: NodeStatus::from_elapsed(elapsed, config.active_ttl, config.warning_ttl),
            last_seen: self.last_seen,
            load: self.load,
            active_jobs: self.active_jobs,
        }
    }
}

/// In-memory registry implementation
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    nodes: Arc<DashMap<NodeName, NodeRecord>>,
    config: RegistryConfig,
    events: broadcast::Sender<RegistryEvent>,
}

impl NodeRegistry {
    /// Create a registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            nodes: Arc::new(DashMap::new()),
            config,
            events,
        }
    }

    /// Subscribe to registration events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Number of known nodes, live or not
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the registry holds no records
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn snapshot(&self, now: DateTime<Utc>) -> Vec<NodeView> {
        let mut views: Vec<NodeView> = self
            .nodes
            .iter()
            .map(|entry| entry.value().view(now, &self.config))
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        views
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Registry for NodeRegistry {
    async fn register(&self, descriptor: NodeDescriptor) -> Result<DateTime<Utc>> {
        let name = descriptor.name.clone();
        let now = Utc::now();

        if self.nodes.len() >= self.config.max_nodes && !self.nodes.contains_key(&name) {
            return Err(RegistryError::Unavailable(format!(
                "node capacity exceeded: {}",
                self.config.max_nodes
            )));
        }

        let role = descriptor.role;
        self.nodes
            .entry(name.clone())
            .and_modify(|record| {
                record.descriptor = descriptor.clone();
                record.last_seen = now;
            })
            .or_insert_with(|| NodeRecord {
                descriptor,
                registered_at: now,
                last_seen: now,
                load: 0.0,
                active_jobs: 0,
            });

        info!(node = %name, role = %role, "Registered node");

        // Nobody listening is fine; the channel is advisory.
        let _ = self.events.send(RegistryEvent::Registered { name, role });

        Ok(now)
    }

    async fn heartbeat(
        &self,
        name: &NodeName,
        telemetry: Option<Heartbeat>,
    ) -> Result<DateTime<Utc>> {
        let now = Utc::now();

        match self.nodes.get_mut(name) {
            Some(mut record) => {
                // Last-write-wins on a monotonically increasing timestamp;
                // concurrent heartbeats from the same node commute.
                if now > record.last_seen {
                    record.last_seen = now;
                }
                if let Some(hb) = telemetry {
                    if let Some(load) = hb.load {
                        record.load = load.clamp(0.0, 1.0);
                    }
                    if let Some(jobs) = hb.active_jobs {
                        record.active_jobs = jobs;
                    }
                }
                debug!(node = %name, "Heartbeat");
            }
            None => {
                warn!(node = %name, "Heartbeat from unregistered node; register first");
            }
        }

        Ok(now)
    }

    async fn list_nodes(&self) -> Result<Vec<NodeView>> {
        Ok(self.snapshot(Utc::now()))
    }

    async fn get(&self, name: &NodeName) -> Result<Option<NodeView>> {
        let now = Utc::now();
        Ok(self
            .nodes
            .get(name)
            .map(|record| record.view(now, &self.config)))
    }

    async fn topology(&self) -> Result<TopologyView> {
        let nodes = self.snapshot(Utc::now());
        Ok(topology::build(nodes))
    }

    async fn stats(&self) -> Result<RegistryStats> {
        let views = self.snapshot(Utc::now());

        let mut stats = RegistryStats {
            total_nodes: views.len(),
            active_nodes: 0,
            warning_nodes: 0,
            offline_nodes: 0,
            nodes_by_role: HashMap::new(),
            total_accelerators: 0,
            total_accelerator_memory_gb: 0.0,
        };

        for view in &views {
            match view.status {
                NodeStatus::Active => stats.active_nodes += 1,
                NodeStatus::Warning => stats.warning_nodes += 1,
                NodeStatus::Offline => stats.offline_nodes += 1,
            }
            *stats
                .nodes_by_role
                .entry(view.role.to_string())
                .or_insert(0) += 1;
            stats.total_accelerators += view.capabilities.accelerator_count;
            stats.total_accelerator_memory_gb += view.capabilities.accelerator_memory_gb;
        }

        Ok(stats)
    }
}
