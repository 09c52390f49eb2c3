//! Pooled per-node clients
//!
//! [`PooledResourceProvider`] keeps idle clients per node so that repeated
//! commands against the same node reuse connections. The cache belongs to the
//! provider instance; dropping or destroying the provider drops the cache.

use crate::cluster::ClusterNode;
use crate::config::ExecutorConfig;
use crate::provider::ClusterNodeResourceProvider;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Opens and closes clients to individual nodes
#[async_trait]
pub trait NodeConnector: Send + Sync {
    type Client: Send + 'static;

    async fn connect(&self, node: &ClusterNode) -> anyhow::Result<Self::Client>;

    async fn close(&self, _client: Self::Client) {}
}

/// Resource provider caching idle clients per node
pub struct PooledResourceProvider<C: NodeConnector> {
    connector: C,
    /// Keyed by node identity (address, or id when there is no address)
    idle: Mutex<HashMap<ClusterNode, Vec<C::Client>>>,
    max_idle_per_node: usize,
    destroyed: AtomicBool,
}

impl<C: NodeConnector> PooledResourceProvider<C> {
    pub fn new(connector: C, max_idle_per_node: usize) -> Self {
        Self {
            connector,
            idle: Mutex::new(HashMap::new()),
            max_idle_per_node,
            destroyed: AtomicBool::new(false),
        }
    }

    /// Pool capped at `config.max_idle_per_node` idle clients per node
    pub fn from_config(connector: C, config: &ExecutorConfig) -> Self {
        Self::new(connector, config.max_idle_per_node)
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Idle clients cached for `node`
    pub fn idle_count(&self, node: &ClusterNode) -> usize {
        self.idle.lock().get(node).map_or(0, Vec::len)
    }

    pub fn total_idle(&self) -> usize {
        self.idle.lock().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl<C: NodeConnector> ClusterNodeResourceProvider for PooledResourceProvider<C> {
    type Client = C::Client;

    async fn acquire(&self, node: &ClusterNode) -> anyhow::Result<Self::Client> {
        if self.destroyed.load(Ordering::Acquire) {
            anyhow::bail!("resource provider has been destroyed");
        }

        let cached = self.idle.lock().get_mut(node).and_then(Vec::pop);
        match cached {
            Some(client) => Ok(client),
            None => {
                debug!("Opening new client to {}", node);
                self.connector.connect(node).await
            }
        }
    }

    async fn release(&self, node: &ClusterNode, client: Self::Client) {
        let overflow = if self.destroyed.load(Ordering::Acquire) {
            Some(client)
        } else {
            let mut idle = self.idle.lock();
            let clients = idle.entry(node.clone()).or_default();
            if clients.len() < self.max_idle_per_node {
                clients.push(client);
                None
            } else {
                Some(client)
            }
        };

        if let Some(client) = overflow {
            self.connector.close(client).await;
        }
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        let drained: Vec<C::Client> = self
            .idle
            .lock()
            .drain()
            .flat_map(|(_, clients)| clients)
            .collect();

        info!("Closing {} pooled cluster clients", drained.len());
        for client in drained {
            self.connector.close(client).await;
        }
    }
}
