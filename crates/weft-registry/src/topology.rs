//! Mesh topology derivation
//!
//! The transport layer is assumed fully meshed, so every pair of known
//! nodes is connected. On top of that the lead node replicates to every
//! backup and compute node, and each accelerator-capable node feeds the
//! inference fabric anchored at the lead.

use crate::registry::NodeView;
use serde::{Deserialize, Serialize};
use weft_core::{NodeName, NodeRole};

/// Kinds of edges in the mesh topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Plain network connectivity (full mesh)
    Mesh,
    /// Data replication from the lead
    Replication,
    /// Inference fabric back to the lead
    Inference,
}

/// A directed or undirected connection between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub source: NodeName,
    pub target: NodeName,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
}

/// Nodes plus derived connections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyView {
    pub nodes: Vec<NodeView>,
    pub connections: Vec<Connection>,
}

/// Derive the topology from a sorted node snapshot
pub fn build(nodes: Vec<NodeView>) -> TopologyView {
    let mut connections = Vec::new();

    // Full mesh: one undirected edge per unordered pair.
    for (i, a) in nodes.iter().enumerate() {
        for b in nodes.iter().skip(i + 1) {
            connections.push(Connection {
                source: a.name.clone(),
                target: b.name.clone(),
                kind: EdgeKind::Mesh,
            });
        }
    }

    let leads: Vec<&NodeView> = nodes.iter().filter(|n| n.role == NodeRole::Lead).collect();

    for lead in &leads {
        for node in &nodes {
            if node.name == lead.name {
                continue;
            }
            connections.push(Connection {
                source: lead.name.clone(),
                target: node.name.clone(),
                kind: EdgeKind::Replication,
            });
            if node.capabilities.accelerated {
                connections.push(Connection {
                    source: node.name.clone(),
                    target: lead.name.clone(),
                    kind: EdgeKind::Inference,
                });
            }
        }
    }

    TopologyView { nodes, connections }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use weft_core::{Capabilities, NodeStatus};

    fn view(name: &str, role: NodeRole, accelerated: bool) -> NodeView {
        NodeView {
            name: NodeName::from(name),
            role,
            address: "127.0.0.1:9000".parse().unwrap(),
            capabilities: if accelerated {
                Capabilities::accelerated(1, 24.0, 8, 64.0)
            } else {
                Capabilities::cpu_only(8, 64.0)
            },
            metadata: HashMap::new(),
            status: NodeStatus::Active,
            last_seen: Utc::now(),
            load: 0.0,
            active_jobs: 0,
        }
    }

    fn count(topo: &TopologyView, kind: EdgeKind) -> usize {
        topo.connections.iter().filter(|c| c.kind == kind).count()
    }

    #[test]
    fn test_full_mesh_pair_count() {
        let topo = build(vec![
            view("a", NodeRole::Compute, false),
            view("b", NodeRole::Compute, false),
            view("c", NodeRole::Compute, false),
            view("d", NodeRole::Compute, false),
        ]);
        // 4 choose 2
        assert_eq!(count(&topo, EdgeKind::Mesh), 6);
        assert_eq!(count(&topo, EdgeKind::Replication), 0);
    }

    #[test]
    fn test_lead_replication_and_inference_edges() {
        let topo = build(vec![
            view("gpu-1", NodeRole::Compute, true),
            view("lead-1", NodeRole::Lead, false),
            view("backup-1", NodeRole::Backup, false),
        ]);

        assert_eq!(count(&topo, EdgeKind::Mesh), 3);
        // lead -> backup, lead -> gpu
        assert_eq!(count(&topo, EdgeKind::Replication), 2);
        // gpu -> lead only
        let inference: Vec<_> = topo
            .connections
            .iter()
            .filter(|c| c.kind == EdgeKind::Inference)
            .collect();
        assert_eq!(inference.len(), 1);
        assert_eq!(inference[0].source.as_str(), "gpu-1");
        assert_eq!(inference[0].target.as_str(), "lead-1");
    }

    #[test]
    fn test_no_lead_no_special_edges() {
        let topo = build(vec![
            view("gpu-1", NodeRole::Compute, true),
            view("gpu-2", NodeRole::Compute, true),
        ]);
        assert_eq!(count(&topo, EdgeKind::Replication), 0);
        assert_eq!(count(&topo, EdgeKind::Inference), 0);
    }
}
