//! Cluster Command Executor
//!
//! Routes commands to cluster nodes:
//! - Single-node execution with bounded redirect following
//! - Concurrent fan-out to many nodes with per-node error capture
//! - Multi-key execution with positional result reassembly
//!
//! Callbacks receive a mutable client handle borrowed from the
//! [`ClusterNodeResourceProvider`] and return a boxed future:
//!
//! ```rust,ignore
//! executor
//!     .execute_on_single_node(|client| Box::pin(async move { client.ping().await }), &node)
//!     .await?;
//! ```

use crate::cluster::{ClusterNode, ClusterTopology, hash_slot};
use crate::config::ExecutorConfig;
use crate::error::{AggregateFailure, ClusterError, ClusterResult};
use crate::provider::{ClusterNodeResourceProvider, ClusterTopologyProvider};
use crate::result::{MultiNodeResult, NodeExecution, NodeResult, PositionalKey, PositionalKeys};
use crate::translation::{ExceptionTranslationStrategy, RedirectTranslator};
use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Future returned by command callbacks, borrowing the client for `'c`
pub type CommandFuture<'c, T> = BoxFuture<'c, anyhow::Result<T>>;

/// Executes commands against a cluster described by a topology provider
pub struct ClusterCommandExecutor<R: ClusterNodeResourceProvider> {
    inner: Arc<ExecutorInner<R>>,
}

struct ExecutorInner<R> {
    topology_provider: Arc<dyn ClusterTopologyProvider>,
    resource_provider: Arc<R>,
    translator: Arc<dyn ExceptionTranslationStrategy>,
    max_redirects: AtomicU32,
    /// Bounds concurrently running fan-out units
    workers: Arc<Semaphore>,
    shut_down: AtomicBool,
}

impl<R: ClusterNodeResourceProvider> Clone for ClusterCommandExecutor<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: ClusterNodeResourceProvider + 'static> ClusterCommandExecutor<R> {
    pub fn new(
        topology_provider: Arc<dyn ClusterTopologyProvider>,
        resource_provider: Arc<R>,
        translator: Arc<dyn ExceptionTranslationStrategy>,
        config: &ExecutorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                topology_provider,
                resource_provider,
                translator,
                max_redirects: AtomicU32::new(config.max_redirects),
                workers: Arc::new(Semaphore::new(config.worker_pool_size.max(1))),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Executor with the default configuration and [`RedirectTranslator`]
    pub fn with_defaults(
        topology_provider: Arc<dyn ClusterTopologyProvider>,
        resource_provider: Arc<R>,
    ) -> Self {
        Self::new(
            topology_provider,
            resource_provider,
            Arc::new(RedirectTranslator),
            &ExecutorConfig::default(),
        )
    }

    pub fn resource_provider(&self) -> &Arc<R> {
        &self.inner.resource_provider
    }

    pub fn max_redirects(&self) -> u32 {
        self.inner.max_redirects.load(Ordering::Relaxed)
    }

    /// Applies to calls started after this returns
    pub fn set_max_redirects(&self, max_redirects: u32) {
        self.inner
            .max_redirects
            .store(max_redirects, Ordering::Relaxed);
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Stop accepting work and destroy the resource provider.
    ///
    /// Units already running finish; queued units fail with
    /// [`ClusterError::Shutdown`].
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.workers.close();
        self.inner.resource_provider.destroy().await;
        info!("Cluster command executor shut down");
    }

    /// Run `callback` on a randomly chosen active node
    pub async fn execute_on_arbitrary_node<T, F>(&self, callback: F) -> ClusterResult<NodeResult<T>>
    where
        F: for<'c> Fn(&'c mut R::Client) -> CommandFuture<'c, T> + Send + Sync,
    {
        self.ensure_running()?;
        let topology = self.topology().await?;
        let node = topology
            .active_nodes()
            .choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| {
                ClusterError::StateFailure(
                    "Could not pick an arbitrary node: no active nodes in topology".to_string(),
                )
            })?;

        self.execute_on_single_node(callback, &node).await
    }

    /// Run `callback` on `node`, following redirects.
    ///
    /// The result carries `node` as given, even when a redirect moved the
    /// command elsewhere.
    pub async fn execute_on_single_node<T, F>(
        &self,
        callback: F,
        node: &ClusterNode,
    ) -> ClusterResult<NodeResult<T>>
    where
        F: for<'c> Fn(&'c mut R::Client) -> CommandFuture<'c, T> + Send + Sync,
    {
        self.ensure_running()?;
        let value = self.run_with_redirects(node, &callback).await?;
        Ok(NodeResult::new(node.clone(), value))
    }

    /// Run `callback` on every active master
    pub async fn execute_on_all_nodes<T, F>(&self, callback: F) -> ClusterResult<MultiNodeResult<T>>
    where
        F: for<'c> Fn(&'c mut R::Client) -> CommandFuture<'c, T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        self.ensure_running()?;
        let masters = self.topology().await?.active_master_nodes();
        self.execute_async_on_nodes(callback, &masters).await
    }

    /// Run `callback` concurrently on each of `nodes`.
    ///
    /// Every node is resolved before anything is dispatched. If any unit
    /// fails the call fails with [`ClusterError::Aggregate`] and the results
    /// of the successful units are dropped.
    pub async fn execute_async_on_nodes<T, F>(
        &self,
        callback: F,
        nodes: &[ClusterNode],
    ) -> ClusterResult<MultiNodeResult<T>>
    where
        F: for<'c> Fn(&'c mut R::Client) -> CommandFuture<'c, T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        self.ensure_running()?;
        let topology = self.topology().await?;
        let resolved = nodes
            .iter()
            .map(|node| resolve_argument(&topology, node))
            .collect::<ClusterResult<Vec<_>>>()?;

        let callback = Arc::new(callback);
        let units = resolved
            .into_iter()
            .map(|node| {
                let executor = self.clone();
                let callback = Arc::clone(&callback);
                let execution = NodeExecution::new(node.clone(), None);
                let unit = async move {
                    let value = executor.run_with_redirects(&node, &*callback).await?;
                    Ok::<_, ClusterError>(NodeResult::new(node, value))
                };
                (execution, unit)
            })
            .collect();

        let mut result = MultiNodeResult::new();
        for (_, node_result) in self.dispatch(units).await? {
            result.add(node_result);
        }
        Ok(result)
    }

    /// Run `callback` once per key on the master serving that key.
    ///
    /// Each result is tagged with its key and input position, so
    /// [`MultiNodeResult::results_as_list_sort_by`] restores the caller's
    /// order. A key whose slot has no master fails the call before dispatch.
    pub async fn execute_multi_key_command<T, F, K>(
        &self,
        callback: F,
        keys: impl IntoIterator<Item = K>,
    ) -> ClusterResult<MultiNodeResult<T>>
    where
        F: for<'c> Fn(&'c mut R::Client, Bytes) -> CommandFuture<'c, T> + Send + Sync + 'static,
        T: Send + 'static,
        K: Into<Bytes>,
    {
        self.ensure_running()?;
        let topology = self.topology().await?;

        let mut groups: Vec<(ClusterNode, PositionalKeys)> = Vec::new();
        let mut group_index: HashMap<ClusterNode, usize> = HashMap::new();
        for (position, key) in keys.into_iter().enumerate() {
            let key: Bytes = key.into();
            let serving = topology.key_serving_nodes(&key);
            if !serving.iter().any(ClusterNode::is_master) {
                return Err(ClusterError::StateFailure(format!(
                    "Could not find master node serving slot {} for key '{}'",
                    hash_slot(&key),
                    String::from_utf8_lossy(&key)
                )));
            }

            for node in serving {
                let idx = *group_index.entry(node.clone()).or_insert_with(|| {
                    groups.push((node, PositionalKeys::new()));
                    groups.len() - 1
                });
                groups[idx]
                    .1
                    .append(PositionalKey::new(key.clone(), position));
            }
        }

        let callback = Arc::new(callback);
        let units = groups
            .into_iter()
            .filter(|(node, _)| node.is_master())
            .flat_map(|(node, keys)| {
                keys.into_iter()
                    .map(move |positional_key| (node.clone(), positional_key))
            })
            .map(|(node, positional_key)| {
                let executor = self.clone();
                let callback = Arc::clone(&callback);
                let execution = NodeExecution::new(node.clone(), Some(positional_key.clone()));
                let unit = async move {
                    let key = positional_key.key().clone();
                    let value = executor
                        .run_with_redirects(&node, |client| (*callback)(client, key.clone()))
                        .await?;
                    Ok::<_, ClusterError>(NodeResult::with_key(node, value, key))
                };
                (execution, unit)
            })
            .collect();

        let mut result = MultiNodeResult::new();
        for (execution, node_result) in self.dispatch(units).await? {
            match execution.positional_key() {
                Some(positional_key) => result.add_positional(positional_key.clone(), node_result),
                None => result.add(node_result),
            }
        }
        Ok(result)
    }

    fn ensure_running(&self) -> ClusterResult<()> {
        if self.is_shut_down() {
            return Err(ClusterError::Shutdown);
        }
        Ok(())
    }

    async fn topology(&self) -> ClusterResult<Arc<ClusterTopology>> {
        self.inner.topology_provider.topology().await
    }

    /// Redirect-following core: at most `max_redirects + 1` attempts
    async fn run_with_redirects<T, G>(&self, requested: &ClusterNode, callback: G) -> ClusterResult<T>
    where
        G: for<'c> Fn(&'c mut R::Client) -> CommandFuture<'c, T> + Send + Sync,
    {
        let topology = self.topology().await?;
        let mut target = resolve_argument(&topology, requested)?;
        drop(topology);

        let max_redirects = self.max_redirects();
        let mut redirects = 0u32;
        loop {
            let raw = match self.invoke(&target, &callback).await? {
                Ok(value) => return Ok(value),
                Err(raw) => raw,
            };

            match self.inner.translator.translate(&raw) {
                Some(ClusterError::Redirect { slot, host, port }) => {
                    if redirects >= max_redirects {
                        warn!(
                            "Giving up on {} after {} redirects (last: slot {} -> {}:{})",
                            requested, redirects, slot, host, port
                        );
                        return Err(ClusterError::TooManyRedirects { max: max_redirects });
                    }
                    redirects += 1;
                    debug!(
                        "Slot {} redirected from {} to {}:{} ({}/{})",
                        slot, target, host, port, redirects, max_redirects
                    );
                    target = self.topology().await?.lookup_address(&host, port)?;
                }
                Some(translated) => return Err(translated),
                None => return Err(ClusterError::Command(raw)),
            }
        }
    }

    /// One attempt: acquire, run, release.
    ///
    /// The outer error is an acquisition failure; the inner one is whatever
    /// the callback returned. The client is released exactly once, even if
    /// the callback panics or the caller drops this future.
    async fn invoke<T, G>(
        &self,
        node: &ClusterNode,
        callback: &G,
    ) -> ClusterResult<anyhow::Result<T>>
    where
        G: for<'c> Fn(&'c mut R::Client) -> CommandFuture<'c, T> + Send + Sync,
    {
        let provider = &self.inner.resource_provider;
        let client = provider.acquire(node).await.map_err(|e| {
            ClusterError::InvalidArgument(format!(
                "Could not acquire resource for node {}: {:#}",
                node, e
            ))
        })?;
        let mut lease = ClientLease {
            provider: Arc::clone(provider),
            node: node.clone(),
            client: Some(client),
        };

        let outcome = AssertUnwindSafe(async {
            match lease.client.as_mut() {
                Some(client) => callback(client).await,
                None => Err(anyhow::anyhow!("client for {} already released", node)),
            }
        })
        .catch_unwind()
        .await;
        lease.release().await;

        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Run units concurrently and wait for all of them.
    ///
    /// Results come back in dispatch order. Dropping the returned future
    /// detaches the units still running; they finish and release their
    /// clients on their own.
    async fn dispatch<T, Fut>(
        &self,
        units: Vec<(NodeExecution, Fut)>,
    ) -> ClusterResult<Vec<(NodeExecution, NodeResult<T>)>>
    where
        Fut: Future<Output = ClusterResult<NodeResult<T>>> + Send + 'static,
        T: Send + 'static,
    {
        let dispatched = units.len();
        let mut tasks = DetachOnDrop(JoinSet::new());
        let mut task_index = HashMap::with_capacity(dispatched);
        let mut executions = Vec::with_capacity(dispatched);

        for (index, (execution, unit)) in units.into_iter().enumerate() {
            debug!("Dispatching {}", execution);
            let workers = Arc::clone(&self.inner.workers);
            let handle = tasks.0.spawn(async move {
                let _permit = workers
                    .acquire_owned()
                    .await
                    .map_err(|_| ClusterError::Shutdown)?;
                unit.await
            });
            task_index.insert(handle.id(), index);
            executions.push(execution);
        }

        let mut outcomes: Vec<Option<ClusterResult<NodeResult<T>>>> =
            (0..dispatched).map(|_| None).collect();
        while let Some(joined) = tasks.0.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(join_error) => (
                    join_error.id(),
                    Err(ClusterError::Command(anyhow::Error::new(join_error))),
                ),
            };
            if let Some(&index) = task_index.get(&id) {
                outcomes[index] = Some(outcome);
            }
        }

        let mut successes = Vec::with_capacity(dispatched);
        let mut failures = Vec::new();
        for (execution, outcome) in executions.into_iter().zip(outcomes) {
            match outcome {
                Some(Ok(node_result)) => successes.push((execution, node_result)),
                Some(Err(e)) => {
                    warn!("Execution on {} failed: {}", execution, e);
                    failures.push((execution, e));
                }
                None => {
                    let e = ClusterError::Command(anyhow::anyhow!("unit did not report a result"));
                    failures.push((execution, e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(AggregateFailure::new(failures, dispatched).into());
        }
        Ok(successes)
    }
}

fn resolve_argument(topology: &ClusterTopology, node: &ClusterNode) -> ClusterResult<ClusterNode> {
    topology
        .lookup(node)
        .map_err(|_| ClusterError::InvalidArgument(format!("Node {} is unknown to cluster", node)))
}

/// Acquired client that goes back to its provider even when the attempt
/// holding it is dropped mid-callback
struct ClientLease<R: ClusterNodeResourceProvider + 'static> {
    provider: Arc<R>,
    node: ClusterNode,
    client: Option<R::Client>,
}

impl<R: ClusterNodeResourceProvider + 'static> ClientLease<R> {
    async fn release(mut self) {
        if let Some(client) = self.client.take() {
            self.provider.release(&self.node, client).await;
        }
    }
}

impl<R: ClusterNodeResourceProvider + 'static> Drop for ClientLease<R> {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Releasing client for {} after cancelled command", self.node);
                let provider = Arc::clone(&self.provider);
                let node = std::mem::take(&mut self.node);
                handle.spawn(async move {
                    provider.release(&node, client).await;
                });
            }
            Err(_) => warn!(
                "No runtime to release client for {}; dropping it",
                self.node
            ),
        }
    }
}

/// Detaches still-running tasks instead of aborting them when dropped
struct DetachOnDrop<T: 'static>(JoinSet<T>);

impl<T: 'static> Drop for DetachOnDrop<T> {
    fn drop(&mut self) {
        self.0.detach_all();
    }
}
