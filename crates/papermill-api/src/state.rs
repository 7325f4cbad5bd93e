//! Application state shared across all handlers.

use std::sync::Arc;
use std::time::Instant;

use papermill_core::config::AppConfig;
use papermill_jobs::{JobDispatcher, ProgressBus};
use papermill_store::ArtifactStore;

/// Shared dependencies, passed to every handler via `State<AppState>`.
/// All fields are `Arc`-wrapped for cheap cloning across tasks.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Artifact store backing downloads.
    pub store: Arc<ArtifactStore>,
    /// Job dispatcher accepting submissions.
    pub dispatcher: Arc<JobDispatcher>,
    /// Progress bus backing WebSocket streams.
    pub bus: Arc<ProgressBus>,
    /// Process start, for the health endpoint's uptime.
    pub started_at: Instant,
}

impl AppState {
    /// Assemble the state from already constructed components.
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<ArtifactStore>,
        dispatcher: Arc<JobDispatcher>,
        bus: Arc<ProgressBus>,
    ) -> Self {
        Self {
            config,
            store,
            dispatcher,
            bus,
            started_at: Instant::now(),
        }
    }
}
