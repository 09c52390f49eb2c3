//! # Synap Cluster Client
//!
//! Command execution engine for hash-slot partitioned Synap clusters.
//!
//! ## Features
//!
//! - **Slot routing**: CRC16 mod 16384 with `{tag}` hash tags
//! - **Redirects**: bounded following of `MOVED`/`ASK` replies
//! - **Fan-out**: concurrent execution on many nodes with aggregated failures
//! - **Multi-key**: per-key dispatch with order restored on demand
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use synap_cluster_client::{ClusterCommandExecutor, StaticTopologyProvider};
//!
//! let topology = Arc::new(StaticTopologyProvider::from_cluster_nodes(&reply)?);
//! let executor = ClusterCommandExecutor::with_defaults(topology, Arc::new(my_pool));
//!
//! let values = executor
//!     .execute_multi_key_command(
//!         |client, key| Box::pin(async move { client.get(&key).await }),
//!         ["foo", "bar", "baz"],
//!     )
//!     .await?;
//! let ordered = values.results_as_list_sort_by(&["foo", "bar", "baz"]);
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod pool;
pub mod provider;
pub mod result;
pub mod translation;

pub use cluster::{
    ClusterNode, ClusterTopology, HashSlot, LinkState, NodeFlags, NodeRole, SlotRange, hash_slot,
};
pub use config::{ExecutorConfig, LoggingConfig};
pub use error::{AggregateFailure, ClusterError, ClusterResult};
pub use executor::{ClusterCommandExecutor, CommandFuture};
pub use logging::init_tracing;
pub use pool::{NodeConnector, PooledResourceProvider};
pub use provider::{ClusterNodeResourceProvider, ClusterTopologyProvider, StaticTopologyProvider};
pub use result::{
    MaybeEmpty, MultiNodeResult, NodeExecution, NodeResult, PositionalKey, PositionalKeys,
};
pub use translation::{
    ExceptionTranslationStrategy, PassThroughTranslator, RedirectError, RedirectKind,
    RedirectTranslator,
};
