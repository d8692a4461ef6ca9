//! Core type definitions for weft

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Unique identifier for a node in the mesh
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeName(String);

impl NodeName {
    /// Create a new NodeName from a string
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the string representation of the NodeName
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&str> for NodeName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Roles that a node can fulfill in the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// The lead node coordinates replication and anchors the inference fabric
    Lead,
    /// Backup nodes receive replicated data from the lead
    Backup,
    /// Compute nodes execute generation tasks
    Compute,
}

impl std::str::FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lead" => Ok(NodeRole::Lead),
            "backup" => Ok(NodeRole::Backup),
            "compute" => Ok(NodeRole::Compute),
            _ => Err(format!("Unknown node role: {}", s)),
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Lead => write!(f, "lead"),
            NodeRole::Backup => write!(f, "backup"),
            NodeRole::Compute => write!(f, "compute"),
        }
    }
}

/// Hardware capabilities a node declares at registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Capabilities {
    /// Whether the node carries inference accelerators
    #[serde(default)]
    pub accelerated: bool,

    /// Number of accelerators
    #[serde(default)]
    pub accelerator_count: u32,

    /// Total accelerator memory in gigabytes
    #[serde(default)]
    pub accelerator_memory_gb: f32,

    /// CPU core count
    #[serde(default)]
    pub cpu_cores: u32,

    /// System RAM in gigabytes
    #[serde(default)]
    pub ram_gb: f32,
}

impl Capabilities {
    /// Capabilities for a CPU-only node
    pub fn cpu_only(cpu_cores: u32, ram_gb: f32) -> Self {
        Self {
            cpu_cores,
            ram_gb,
            ..Default::default()
        }
    }

    /// Capabilities for an accelerator-equipped node
    pub fn accelerated(count: u32, memory_gb: f32, cpu_cores: u32, ram_gb: f32) -> Self {
        Self {
            accelerated: true,
            accelerator_count: count,
            accelerator_memory_gb: memory_gb,
            cpu_cores,
            ram_gb,
        }
    }
}

/// Everything a node declares about itself when registering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Unique node name (one per process identity)
    pub name: NodeName,

    /// Role within the mesh
    pub role: NodeRole,

    /// Network address of the node's execution endpoint
    pub address: SocketAddr,

    /// Declared hardware capabilities
    #[serde(default)]
    pub capabilities: Capabilities,

    /// Free-form metadata; the `zone` key participates in latency estimation
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl NodeDescriptor {
    /// Create a descriptor with empty metadata
    pub fn new(
        name: impl Into<NodeName>,
        role: NodeRole,
        address: SocketAddr,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            address,
            capabilities,
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The network zone this node declared, if any
    pub fn zone(&self) -> Option<&str> {
        self.metadata.get("zone").map(|s| s.as_str())
    }
}

/// Liveness classification derived from heartbeat age
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Heartbeat seen within the active threshold
    Active,
    /// Heartbeat seen within the warning threshold
    Warning,
    /// No heartbeat within the warning threshold
    Offline,
}

impl NodeStatus {
    /// Classify liveness from elapsed time since the last heartbeat.
    ///
    /// Status is a pure function of `now - last_seen` relative to the two
    /// thresholds; records never need active expiry.
    pub fn from_elapsed(elapsed: Duration, active_ttl: Duration, warning_ttl: Duration) -> Self {
        if elapsed < active_ttl {
            NodeStatus::Active
        } else if elapsed < warning_ttl {
            NodeStatus::Warning
        } else {
            NodeStatus::Offline
        }
    }

    /// Whether this status qualifies a node for dispatch
    pub fn is_live(&self) -> bool {
        matches!(self, NodeStatus::Active)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Active => write!(f, "active"),
            NodeStatus::Warning => write!(f, "warning"),
            NodeStatus::Offline => write!(f, "offline"),
        }
    }
}
