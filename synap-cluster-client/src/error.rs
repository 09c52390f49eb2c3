//! Error types for cluster command execution

use crate::result::NodeExecution;
use std::fmt;
use thiserror::Error;

/// Cluster error types
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Topology lookup found no match (usually a stale local topology)
    #[error("Cluster state failure: {0}")]
    StateFailure(String),

    /// Node answered that the slot now lives elsewhere
    #[error("Redirect: slot {slot} is served by {host}:{port}")]
    Redirect { slot: u16, host: String, port: u16 },

    #[error("Too many redirects: exceeded the limit of {max}")]
    TooManyRedirects { max: u32 },

    #[error(transparent)]
    Aggregate(#[from] AggregateFailure),

    /// Unknown node or a node whose resource could not be acquired
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cluster is down: {0}")]
    ClusterDown(String),

    /// Raw command failure the translator did not classify
    #[error("Command failed: {0}")]
    Command(#[source] anyhow::Error),

    #[error("Executor has been shut down")]
    Shutdown,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClusterError {
    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Redirect { .. })
    }
}

/// Cluster result type
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Failure of one or more units in a fan-out call.
///
/// Results of the units that did succeed are not carried here.
#[derive(Debug, Default)]
pub struct AggregateFailure {
    causes: Vec<(NodeExecution, ClusterError)>,
    dispatched: usize,
}

impl AggregateFailure {
    pub(crate) fn new(causes: Vec<(NodeExecution, ClusterError)>, dispatched: usize) -> Self {
        Self { causes, dispatched }
    }

    /// One entry per failed unit, in dispatch order
    pub fn causes(&self) -> &[(NodeExecution, ClusterError)] {
        &self.causes
    }

    pub fn into_causes(self) -> Vec<(NodeExecution, ClusterError)> {
        self.causes
    }

    pub fn len(&self) -> usize {
        self.causes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }

    /// Number of units that were dispatched in the failed call
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} cluster node executions failed",
            self.causes.len(),
            self.dispatched
        )?;
        for (execution, cause) in &self.causes {
            write!(f, "; {}: {}", execution, cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateFailure {}
