//! In-memory job table.
//!
//! Tracks each dispatched job's lifecycle phase while it is alive. A job is
//! removed right after its terminal event is broadcast, so the table only
//! ever holds queued and running work.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use papermill_core::types::JobId;

use crate::kind::OperationKind;

/// Lifecycle phase of a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    /// Accepted and waiting for a worker slot.
    Queued,
    /// Executing on a worker.
    Running,
}

/// One tracked job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    /// Operation being executed.
    pub kind: OperationKind,
    /// Current phase.
    pub phase: JobPhase,
    /// When the job was accepted.
    pub submitted_at: DateTime<Utc>,
}

/// Concurrent table of live jobs.
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: DashMap<JobId, JobRecord>,
}

impl JobTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly accepted job.
    pub fn insert(&self, job_id: JobId, kind: OperationKind) {
        self.jobs.insert(
            job_id,
            JobRecord {
                kind,
                phase: JobPhase::Queued,
                submitted_at: Utc::now(),
            },
        );
    }

    /// Move a job into a new phase. Unknown ids are ignored; the job may
    /// already have finished.
    pub fn set_phase(&self, job_id: &JobId, phase: JobPhase) {
        if let Some(mut record) = self.jobs.get_mut(job_id) {
            record.phase = phase;
        }
    }

    /// Drop a finished job.
    pub fn remove(&self, job_id: &JobId) {
        self.jobs.remove(job_id);
    }

    /// Look up a live job.
    pub fn get(&self, job_id: &JobId) -> Option<JobRecord> {
        self.jobs.get(job_id).map(|r| r.clone())
    }

    /// Number of live (queued or running) jobs.
    pub fn live_count(&self) -> usize {
        self.jobs.len()
    }

    /// Number of jobs currently executing.
    pub fn running_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|r| r.phase == JobPhase::Running)
            .count()
    }
}
