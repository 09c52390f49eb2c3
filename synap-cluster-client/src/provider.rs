//! Collaborators consumed by the executor
//!
//! - [`ClusterTopologyProvider`]: supplies the current topology snapshot
//! - [`ClusterNodeResourceProvider`]: scoped per-node client handles

use crate::cluster::{ClusterNode, ClusterTopology};
use crate::error::ClusterResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Source of topology snapshots.
///
/// The executor calls this at the start of every top-level operation (and
/// again before following a redirect); implementations decide how fresh the
/// answer is.
#[async_trait]
pub trait ClusterTopologyProvider: Send + Sync {
    async fn topology(&self) -> ClusterResult<Arc<ClusterTopology>>;
}

/// Scoped acquisition of per-node client handles.
///
/// Every successful [`acquire`](Self::acquire) is paired with exactly one
/// [`release`](Self::release), whatever the command outcome. Both are called
/// concurrently from executor tasks.
#[async_trait]
pub trait ClusterNodeResourceProvider: Send + Sync {
    type Client: Send + 'static;

    async fn acquire(&self, node: &ClusterNode) -> anyhow::Result<Self::Client>;

    /// Return, pool or close the handle
    async fn release(&self, node: &ClusterNode, client: Self::Client);

    /// Dispose of any lifecycle resources; called on executor shutdown
    async fn destroy(&self) {}
}

/// Topology provider holding a snapshot that can be swapped at runtime
#[derive(Debug)]
pub struct StaticTopologyProvider {
    topology: RwLock<Arc<ClusterTopology>>,
}

impl StaticTopologyProvider {
    pub fn new(topology: ClusterTopology) -> Self {
        Self {
            topology: RwLock::new(Arc::new(topology)),
        }
    }

    /// Provider seeded from a `CLUSTER NODES` reply
    pub fn from_cluster_nodes(reply: &str) -> ClusterResult<Self> {
        Ok(Self::new(ClusterTopology::from_cluster_nodes(reply)?))
    }

    /// Replace the snapshot handed out to subsequent calls
    pub fn update(&self, topology: ClusterTopology) {
        debug!("Replacing topology snapshot ({} nodes)", topology.len());
        *self.topology.write() = Arc::new(topology);
    }

    pub fn current(&self) -> Arc<ClusterTopology> {
        Arc::clone(&self.topology.read())
    }
}

#[async_trait]
impl ClusterTopologyProvider for StaticTopologyProvider {
    async fn topology(&self) -> ClusterResult<Arc<ClusterTopology>> {
        Ok(self.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::SlotRange;

    #[tokio::test]
    async fn test_static_provider_update() {
        let provider = StaticTopologyProvider::new(
            ClusterTopology::evenly_sharded([("127.0.0.1", 7000)]).unwrap(),
        );
        let before = provider.topology().await.unwrap();
        assert_eq!(before.len(), 1);

        provider.update(ClusterTopology::new([
            ClusterNode::master("a", "127.0.0.1", 7000, SlotRange::new(0, 8191)),
            ClusterNode::master("b", "127.0.0.1", 7001, SlotRange::new(8192, 16383)),
        ]));

        // Earlier snapshots are unaffected
        assert_eq!(before.len(), 1);
        assert_eq!(provider.topology().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_static_provider_from_reply() {
        let provider = StaticTopologyProvider::from_cluster_nodes(
            "abc 127.0.0.1:7000@17000 myself,master - 0 0 1 connected 0-16383",
        )
        .unwrap();
        assert!(provider.current().has_full_coverage());
    }
}
