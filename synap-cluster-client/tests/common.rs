//! Common test utilities

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use synap_cluster_client::{
    ClusterCommandExecutor, ClusterNode, ClusterNodeResourceProvider, ClusterTopology,
    CommandFuture, ExecutorConfig, RedirectTranslator, SlotRange, StaticTopologyProvider,
};

pub const HOST: &str = "127.0.0.1";

/// Client handle to an in-memory node
#[derive(Debug)]
pub struct FakeClient {
    pub port: u16,
}

/// Resource provider that counts acquisitions and releases
#[derive(Default)]
pub struct FakeResources {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub destroyed: AtomicBool,
    /// Ports whose clients cannot be acquired
    pub unreachable: Mutex<HashSet<u16>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

#[allow(dead_code)] // Used by other test modules
impl FakeResources {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn make_unreachable(&self, port: u16) {
        self.unreachable.lock().insert(port);
    }
}

#[async_trait]
impl ClusterNodeResourceProvider for FakeResources {
    type Client = FakeClient;

    async fn acquire(&self, node: &ClusterNode) -> anyhow::Result<FakeClient> {
        let port = node
            .port
            .ok_or_else(|| anyhow::anyhow!("node {} has no port", node))?;
        if self.unreachable.lock().contains(&port) {
            anyhow::bail!("connection refused: {}:{}", HOST, port);
        }

        self.acquired.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        Ok(FakeClient { port })
    }

    async fn release(&self, _node: &ClusterNode, _client: FakeClient) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Three masters on ports 7000-7002 owning `[0,5460]`, `[5461,10922]`, `[10923,16383]`
#[allow(dead_code)] // Used by other test modules
pub fn three_masters() -> ClusterTopology {
    ClusterTopology::new(master_nodes())
}

#[allow(dead_code)] // Used by other test modules
pub fn master_nodes() -> Vec<ClusterNode> {
    vec![
        ClusterNode::master("m0", HOST, 7000, SlotRange::new(0, 5460)),
        ClusterNode::master("m1", HOST, 7001, SlotRange::new(5461, 10922)),
        ClusterNode::master("m2", HOST, 7002, SlotRange::new(10923, 16383)),
    ]
}

/// Three masters plus one replica per master on ports 7100-7102
#[allow(dead_code)] // Used by other test modules
pub fn masters_with_replicas() -> ClusterTopology {
    let masters = master_nodes();
    let replicas: Vec<ClusterNode> = masters
        .iter()
        .enumerate()
        .map(|(i, m)| ClusterNode::replica_of(format!("r{}", i), HOST, 7100 + i as u16, m))
        .collect();
    ClusterTopology::new(masters.into_iter().chain(replicas))
}

pub struct TestCluster {
    pub topology: Arc<StaticTopologyProvider>,
    pub resources: Arc<FakeResources>,
    pub executor: ClusterCommandExecutor<FakeResources>,
}

/// Executor over `topology` with the default configuration
#[allow(dead_code)] // Used by other test modules
pub fn setup_cluster(topology: ClusterTopology) -> TestCluster {
    setup_cluster_with_config(topology, &ExecutorConfig::default())
}

#[allow(dead_code)] // Used by other test modules
pub fn setup_cluster_with_config(topology: ClusterTopology, config: &ExecutorConfig) -> TestCluster {
    let provider = Arc::new(StaticTopologyProvider::new(topology));
    let resources = Arc::new(FakeResources::default());
    let executor = ClusterCommandExecutor::new(
        provider.clone(),
        resources.clone(),
        Arc::new(RedirectTranslator),
        config,
    );
    TestCluster {
        topology: provider,
        resources,
        executor,
    }
}

/// Callback answering with the port of the node it ran on
#[allow(dead_code)] // Used by other test modules
pub fn reply_port(client: &mut FakeClient) -> CommandFuture<'_, u16> {
    Box::pin(async move { Ok(client.port) })
}
