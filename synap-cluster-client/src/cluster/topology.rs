//! Cluster Topology Snapshot
//!
//! Immutable view of the cluster nodes, their roles and the slots they serve,
//! captured at one point in time. A new snapshot is fetched from the
//! [`ClusterTopologyProvider`](crate::provider::ClusterTopologyProvider) at the
//! start of every top-level operation; snapshots are never mutated.

use super::hash_slot::hash_slot;
use super::types::{ClusterNode, NodeRole, SlotRange, TOTAL_SLOTS};
use crate::error::{ClusterError, ClusterResult};
use std::collections::HashSet;

/// Cluster topology snapshot
#[derive(Debug, Clone, Default)]
pub struct ClusterTopology {
    nodes: Vec<ClusterNode>,
}

impl ClusterTopology {
    pub fn new(nodes: impl IntoIterator<Item = ClusterNode>) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
        }
    }

    /// Masters at the given addresses splitting the slot space evenly (for testing/bootstrap)
    pub fn evenly_sharded<H: Into<String>>(
        addresses: impl IntoIterator<Item = (H, u16)>,
    ) -> ClusterResult<Self> {
        let addresses: Vec<(String, u16)> = addresses
            .into_iter()
            .map(|(host, port)| (host.into(), port))
            .collect();
        let node_count = addresses.len();
        if node_count == 0 || node_count > TOTAL_SLOTS as usize {
            return Err(ClusterError::Config("Invalid node count".to_string()));
        }

        let slots_per_node = TOTAL_SLOTS / node_count as u16;
        let nodes = addresses
            .into_iter()
            .enumerate()
            .map(|(i, (host, port))| {
                let start_slot = (i as u16) * slots_per_node;
                let end_slot = if i == node_count - 1 {
                    TOTAL_SLOTS - 1
                } else {
                    start_slot + slots_per_node - 1
                };
                ClusterNode::master(
                    format!("node-{}", i),
                    host,
                    port,
                    SlotRange::new(start_slot, end_slot),
                )
            })
            .collect::<Vec<_>>();

        Ok(Self::new(nodes))
    }

    /// All known nodes
    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes with a connected link and no fail/pfail flag
    pub fn active_nodes(&self) -> Vec<ClusterNode> {
        self.nodes.iter().filter(|n| n.is_active()).cloned().collect()
    }

    /// Active nodes with the master role
    pub fn active_master_nodes(&self) -> Vec<ClusterNode> {
        self.nodes
            .iter()
            .filter(|n| n.is_active() && n.is_master())
            .cloned()
            .collect()
    }

    /// All masters, regardless of link state
    pub fn master_nodes(&self) -> Vec<ClusterNode> {
        self.nodes.iter().filter(|n| n.is_master()).cloned().collect()
    }

    /// Replicas whose `master_id` points at `master`
    pub fn replicas_of(&self, master: &ClusterNode) -> Vec<ClusterNode> {
        let Some(master_id) = master.node_id() else {
            return Vec::new();
        };
        self.nodes
            .iter()
            .filter(|n| n.role == NodeRole::Replica && n.master_id.as_deref() == Some(master_id))
            .cloned()
            .collect()
    }

    /// Masters and replicas serving `slot`
    pub fn slot_serving_nodes(&self, slot: u16) -> Vec<ClusterNode> {
        self.nodes
            .iter()
            .filter(|n| n.serves_slot(slot))
            .cloned()
            .collect()
    }

    /// Masters and replicas serving the slot of `key`
    pub fn key_serving_nodes(&self, key: &[u8]) -> Vec<ClusterNode> {
        self.slot_serving_nodes(hash_slot(key))
    }

    /// The master serving the slot of `key`, whatever its link state
    pub fn key_serving_master_node(&self, key: &[u8]) -> ClusterResult<ClusterNode> {
        let slot = hash_slot(key);
        self.nodes
            .iter()
            .find(|n| n.is_master() && n.serves_slot(slot))
            .cloned()
            .ok_or_else(|| {
                ClusterError::StateFailure(format!(
                    "Could not find master node serving slot {} for key '{}'",
                    slot,
                    String::from_utf8_lossy(key)
                ))
            })
    }

    /// Resolve a node by address
    pub fn lookup_address(&self, host: &str, port: u16) -> ClusterResult<ClusterNode> {
        self.nodes
            .iter()
            .find(|n| n.address() == Some((host, port)))
            .cloned()
            .ok_or_else(|| {
                ClusterError::StateFailure(format!(
                    "Could not find node at {}:{}; is your cluster info up to date?",
                    host, port
                ))
            })
    }

    /// Resolve a node by id
    pub fn lookup_id(&self, id: &str) -> ClusterResult<ClusterNode> {
        self.nodes
            .iter()
            .find(|n| n.node_id() == Some(id))
            .cloned()
            .ok_or_else(|| {
                ClusterError::StateFailure(format!(
                    "Could not find node with id '{}'; is your cluster info up to date?",
                    id
                ))
            })
    }

    /// Resolve a caller-supplied descriptor against this snapshot.
    ///
    /// An exact match on address and id wins. Otherwise the address is tried
    /// first, then the id.
    pub fn lookup(&self, node: &ClusterNode) -> ClusterResult<ClusterNode> {
        if node.address().is_some() && node.node_id().is_some() {
            if let Some(exact) = self
                .nodes
                .iter()
                .find(|n| *n == node && n.node_id() == node.node_id())
            {
                return Ok(exact.clone());
            }
        }

        if let Some((host, port)) = node.address() {
            return self.lookup_address(host, port);
        }

        if let Some(id) = node.node_id() {
            return self.lookup_id(id);
        }

        Err(ClusterError::StateFailure(format!(
            "Could not find node {}; have you provided either host and port or the node id?",
            node
        )))
    }

    /// Number of slots served by at least one master
    pub fn covered_slots(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.is_master())
            .flat_map(|n| n.slots.slots())
            .collect::<HashSet<u16>>()
            .len()
    }

    /// Check if every slot has a master
    pub fn has_full_coverage(&self) -> bool {
        self.covered_slots() == TOTAL_SLOTS as usize
    }

    /// Get slot coverage percentage
    pub fn slot_coverage(&self) -> f64 {
        (self.covered_slots() as f64 / TOTAL_SLOTS as f64) * 100.0
    }
}
