//! Global configuration schema, loaded from `config.toml` in the data
//! directory by the infra layer.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub http: HttpConfig,
    pub worker: WorkerConfig,
}

/// HTTP server binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Worker pool sizing and queue polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Concurrent activity executors.
    pub activity_workers: usize,
    /// Concurrent workflow drivers (distinct instances only).
    pub workflow_workers: usize,
    /// Sleep between empty queue polls.
    pub poll_interval_ms: u64,
    /// Queue delivery lease; an unacked task is redelivered after this.
    pub lease_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            activity_workers: 4,
            workflow_workers: 2,
            poll_interval_ms: 250,
            lease_secs: 60,
        }
    }
}
