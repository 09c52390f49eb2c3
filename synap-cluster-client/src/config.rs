use crate::error::ClusterError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Executor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Redirects followed per single-node call before giving up
    pub max_redirects: u32,

    /// Fan-out units allowed to run at the same time
    pub worker_pool_size: usize,

    /// Idle clients kept per node by the pooled resource provider
    pub max_idle_per_node: usize,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `json`, `pretty` or `text`
    pub format: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_redirects: 5,
            worker_pool_size: 16,
            max_idle_per_node: 8,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl ExecutorConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ExecutorConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `SYNAP_CLUSTER_*` environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup("SYNAP_CLUSTER_MAX_REDIRECTS") {
            config.max_redirects = value.parse()?;
        }
        if let Some(value) = lookup("SYNAP_CLUSTER_WORKER_POOL_SIZE") {
            config.worker_pool_size = value.parse()?;
        }
        if let Some(value) = lookup("SYNAP_CLUSTER_MAX_IDLE_PER_NODE") {
            config.max_idle_per_node = value.parse()?;
        }
        if let Some(value) = lookup("SYNAP_CLUSTER_LOG_LEVEL") {
            config.logging.level = value;
        }
        if let Some(value) = lookup("SYNAP_CLUSTER_LOG_FORMAT") {
            config.logging.format = value;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ClusterError> {
        if self.worker_pool_size == 0 {
            return Err(ClusterError::Config(
                "worker_pool_size must be at least 1".to_string(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty" | "text") {
            return Err(ClusterError::Config(format!(
                "unknown log format '{}'",
                self.logging.format
            )));
        }
        Ok(())
    }
}
