//! Artifact retention configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retention sweeper configuration.
///
/// The retention window must stay generous relative to the sweep interval:
/// a file is guaranteed to survive at least `max_age_secs` and to be gone
/// within `max_age_secs + sweep_interval_secs` of its last modification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Seconds between sweep passes.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Age in seconds past which an entry is reclaimed.
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
    /// Delete attempts for a file that is locked or in use.
    #[serde(default = "default_delete_retries")]
    pub delete_retries: u32,
    /// Seconds between delete attempts.
    #[serde(default = "default_delete_retry_delay")]
    pub delete_retry_delay_secs: u64,
}

impl RetentionConfig {
    /// Interval between sweep passes.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Retention threshold.
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Delay between delete attempts on a locked file.
    pub fn delete_retry_delay(&self) -> Duration {
        Duration::from_secs(self.delete_retry_delay_secs)
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            max_age_secs: default_max_age(),
            delete_retries: default_delete_retries(),
            delete_retry_delay_secs: default_delete_retry_delay(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_max_age() -> u64 {
    900
}

fn default_delete_retries() -> u32 {
    3
}

fn default_delete_retry_delay() -> u64 {
    2
}
