//! Job worker pool configuration.

use serde::{Deserialize, Serialize};

/// Job worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum number of jobs executing concurrently. Accepted jobs beyond
    /// this cap queue in submission order.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

fn default_max_concurrent_jobs() -> usize {
    4
}
