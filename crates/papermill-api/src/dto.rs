//! Response bodies that are not defined by the job core.

use serde::{Deserialize, Serialize};

/// Body of `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "ok" when the server answers at all.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Seconds since the process started.
    pub uptime_secs: u64,
    /// Jobs currently queued or running.
    pub active_jobs: usize,
}
