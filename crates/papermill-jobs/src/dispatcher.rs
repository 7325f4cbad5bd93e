//! The job dispatcher.
//!
//! `submit` validates synchronously, stages inputs, and hands the job to an
//! independently scheduled worker, returning an acknowledgment immediately.
//! The worker boundary converts every handler outcome into exactly one
//! terminal event; nothing a handler does can take the dispatcher down.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use papermill_core::error::AppError;
use papermill_core::events::{JobStatus, ProgressEvent};
use papermill_core::types::JobId;
use papermill_store::{Artifact, ArtifactStore};

use crate::handler::{HandlerContext, OperationHandler};
use crate::kind::OperationKind;
use crate::progress::{JobProgress, ProgressBus};
use crate::registry::OperationRegistry;
use crate::tracker::{JobPhase, JobTracker};

/// Acknowledgment status: the final result is never returned here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    /// Accepted; the job is running or queued.
    Processing,
    /// Rejected synchronously; no worker was spawned.
    Error,
}

/// Immediate response to a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAck {
    /// Whether the job was accepted.
    pub status: AckStatus,
    /// Human-readable acknowledgment or validation message.
    pub message: String,
    /// Correlation id for the progress stream. Present on acceptance and on
    /// validation failure, since the error event is addressable too.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
}

impl SubmitAck {
    fn processing(message: &str, job_id: JobId) -> Self {
        Self {
            status: AckStatus::Processing,
            message: message.to_string(),
            job_id: Some(job_id),
        }
    }

    fn error(message: impl Into<String>, job_id: JobId) -> Self {
        Self {
            status: AckStatus::Error,
            message: message.into(),
            job_id: Some(job_id),
        }
    }
}

/// One uploaded input payload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name the client uploaded the file under.
    pub name: String,
    /// File content.
    pub data: Bytes,
}

/// Accepts operation requests and runs each on a bounded worker pool.
#[derive(Debug)]
pub struct JobDispatcher {
    registry: Arc<OperationRegistry>,
    store: Arc<ArtifactStore>,
    bus: Arc<ProgressBus>,
    tracker: Arc<JobTracker>,
    permits: Arc<Semaphore>,
}

impl JobDispatcher {
    /// Create a dispatcher capping concurrent workers at
    /// `max_concurrent_jobs`. Accepted jobs beyond the cap queue FIFO on
    /// the semaphore; submission itself never blocks on the cap.
    pub fn new(
        registry: Arc<OperationRegistry>,
        store: Arc<ArtifactStore>,
        bus: Arc<ProgressBus>,
        tracker: Arc<JobTracker>,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            registry,
            store,
            bus,
            tracker,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    /// Submit one operation request.
    ///
    /// Returns as soon as validation and input staging finish. On any
    /// validation failure a single error event is published and no worker
    /// is spawned.
    pub async fn submit(
        &self,
        kind: OperationKind,
        uploads: Vec<UploadedFile>,
        fields: HashMap<String, String>,
    ) -> SubmitAck {
        let job_id = JobId::generate();

        // Empty parts from multipart forms carry no payload worth staging.
        let uploads: Vec<UploadedFile> = uploads
            .into_iter()
            .filter(|u| !u.name.is_empty() && !u.data.is_empty())
            .collect();

        let options = match self.registry.validate(kind, uploads.len(), &fields) {
            Ok(options) => options,
            Err(err) => return self.reject(kind, job_id, err),
        };
        // Infallible after validate, but the lookup stays explicit.
        let handler = match self.registry.handler(kind) {
            Ok(handler) => handler,
            Err(err) => return self.reject(kind, job_id, err),
        };

        let mut inputs = Vec::with_capacity(uploads.len());
        let mut declared_names = Vec::with_capacity(uploads.len());
        for upload in uploads {
            match self.store.stage_input(&job_id, &upload.name, upload.data).await {
                Ok(artifact) => {
                    inputs.push(artifact);
                    declared_names.push(upload.name);
                }
                Err(err) => {
                    self.discard_staged(&inputs).await;
                    return self.reject(kind, job_id, err);
                }
            }
        }

        info!(job_id = %job_id, operation = %kind, inputs = inputs.len(), "Job accepted");
        self.tracker.insert(job_id.clone(), kind);
        // The job's channel must exist before the client learns the id, so
        // a subscriber arriving right after the ack never misses it.
        self.bus.open_job(&job_id);

        let progress = JobProgress::new(Arc::clone(&self.bus), job_id.clone(), kind.wire_name());
        let ctx = HandlerContext {
            job_id: job_id.clone(),
            kind,
            inputs,
            declared_names,
            options,
            progress,
            store: Arc::clone(&self.store),
        };
        let tracker = Arc::clone(&self.tracker);
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            run_job(handler, ctx, tracker, permits).await;
        });

        SubmitAck::processing(kind.ack_message(), job_id)
    }

    /// Live job lookup for status surfaces.
    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    fn reject(&self, kind: OperationKind, job_id: JobId, err: AppError) -> SubmitAck {
        let message = if err.is_user_facing() {
            err.message.clone()
        } else {
            error!(job_id = %job_id, operation = %kind, error = %err, "Submission failed");
            format!("Error processing request: {}", err.message)
        };
        self.bus.publish(
            ProgressEvent::new(job_id.clone(), kind.wire_name(), JobStatus::Error)
                .with_message(format!("⚠️ {message}")),
        );
        SubmitAck::error(message, job_id)
    }

    /// Remove inputs staged before a later one failed, so a rejected
    /// submission leaves nothing behind for the sweeper.
    async fn discard_staged(&self, staged: &[Artifact]) {
        for artifact in staged {
            if let Err(err) = tokio::fs::remove_file(&artifact.path).await {
                warn!(name = %artifact.name, error = %err, "Failed to discard staged input");
            }
        }
    }
}

/// Execute one job on a worker slot.
///
/// Every exit path out of the handler, including a panic, produces exactly
/// one terminal event and removes the job from the tracker.
async fn run_job(
    handler: Arc<dyn OperationHandler>,
    ctx: HandlerContext,
    tracker: Arc<JobTracker>,
    permits: Arc<Semaphore>,
) {
    let job_id = ctx.job_id.clone();
    let progress = ctx.progress.clone();

    let _permit = match Arc::clone(&permits).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            progress.fail("Error processing request: worker pool closed", "Worker pool closed");
            tracker.remove(&job_id);
            return;
        }
    };
    tracker.set_phase(&job_id, JobPhase::Running);
    info!(job_id = %job_id, operation = %ctx.kind, "Job started");

    match AssertUnwindSafe(handler.handle(&ctx)).catch_unwind().await {
        Ok(Ok(outcome)) => {
            info!(job_id = %job_id, operation = %ctx.kind, outputs = outcome.downloads.len(), "Job succeeded");
            progress.succeed(outcome.message, outcome.downloads, outcome.log_entry);
        }
        Ok(Err(err)) => {
            error!(job_id = %job_id, operation = %ctx.kind, error = %err, "Job failed");
            progress.fail(&err.message, err.message.clone());
        }
        Err(_) => {
            error!(job_id = %job_id, operation = %ctx.kind, "Job handler panicked");
            progress.fail(
                "Error processing request: internal failure",
                "Handler panicked",
            );
        }
    }
    tracker.remove(&job_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use papermill_core::config::storage::StorageConfig;

    use crate::handler::{HandlerError, HandlerOutcome};
    use crate::registry::RegistryBuilder;

    /// Test handler that writes one output and reports it.
    #[derive(Debug)]
    struct EchoHandler {
        kind: OperationKind,
        label: &'static str,
    }

    #[async_trait]
    impl OperationHandler for EchoHandler {
        fn kind(&self) -> OperationKind {
            self.kind
        }

        async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
            ctx.progress.update("Working...", 50);
            let slot = ctx.store.allocate_output(
                &ctx.job_id,
                &ctx.base_name(),
                ctx.kind.tag(),
                "pdf",
            );
            let artifact = ctx
                .store
                .write_output(slot, Bytes::from_static(b"result"))
                .await?;
            Ok(HandlerOutcome {
                message: "PDFs merged successfully!".to_string(),
                downloads: vec![artifact.to_descriptor(self.label)],
                log_entry: format!("Wrote {}", artifact.name),
            })
        }
    }

    #[derive(Debug)]
    struct FailingHandler;

    #[async_trait]
    impl OperationHandler for FailingHandler {
        fn kind(&self) -> OperationKind {
            OperationKind::Compress
        }

        async fn handle(&self, _ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
            Err(HandlerError::new("Error compressing PDF: ghostscript exited with code 1"))
        }
    }

    /// Handler that records how many invocations overlap.
    #[derive(Debug)]
    struct SlowHandler {
        concurrent: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OperationHandler for SlowHandler {
        fn kind(&self) -> OperationKind {
            OperationKind::Rotate
        }

        async fn handle(&self, _ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            Ok(HandlerOutcome {
                message: "PDF rotated successfully!".to_string(),
                downloads: Vec::new(),
                log_entry: "rotated".to_string(),
            })
        }
    }

    struct TestRig {
        _dir: tempfile::TempDir,
        dispatcher: JobDispatcher,
        bus: Arc<ProgressBus>,
    }

    async fn rig(builder: RegistryBuilder, max_jobs: usize) -> TestRig {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            data_dir: dir.path().to_string_lossy().to_string(),
        };
        let store = Arc::new(ArtifactStore::new(&config).await.unwrap());
        let bus = Arc::new(ProgressBus::default());
        let dispatcher = JobDispatcher::new(
            Arc::new(builder.build()),
            store,
            Arc::clone(&bus),
            Arc::new(JobTracker::new()),
            max_jobs,
        );
        TestRig {
            _dir: dir,
            dispatcher,
            bus,
        }
    }

    fn pdf(name: &str) -> UploadedFile {
        UploadedFile {
            name: name.to_string(),
            data: Bytes::from_static(b"%PDF-1.4 content"),
        }
    }

    #[tokio::test]
    async fn test_merge_accepted_and_succeeds() {
        let rig = rig(
            OperationRegistry::builder().register(Arc::new(EchoHandler {
                kind: OperationKind::Merge,
                label: "Merged PDF",
            })),
            4,
        )
        .await;

        let ack = rig
            .dispatcher
            .submit(
                OperationKind::Merge,
                vec![pdf("a.pdf"), pdf("b.pdf"), pdf("c.pdf")],
                HashMap::new(),
            )
            .await;
        assert_eq!(ack.status, AckStatus::Processing);
        assert_eq!(ack.message, "Merging PDFs...");
        let job_id = ack.job_id.expect("acceptance carries the job id");

        let mut rx = rig.bus.subscribe_job(&job_id);
        let terminal = loop {
            let event = rx.recv().await.expect("stream open until terminal");
            assert_eq!(event.job_id, job_id);
            if event.is_terminal() {
                break event;
            }
        };
        assert_eq!(terminal.status, JobStatus::Success);
        let downloads = terminal.downloads.expect("success carries downloads");
        assert_eq!(downloads.len(), 1);
        assert_eq!(downloads[0].type_label, "Merged PDF");
        assert!(downloads[0].url.starts_with("/download/"));
        assert!(downloads[0].name.contains(job_id.as_str()));

        // Nothing tracked once the terminal event is out.
        assert_eq!(rig.dispatcher.tracker().live_count(), 0);
    }

    #[tokio::test]
    async fn test_job_channel_open_at_ack_and_closed_after_terminal() {
        let rig = rig(
            OperationRegistry::builder().register(Arc::new(EchoHandler {
                kind: OperationKind::Merge,
                label: "Merged PDF",
            })),
            4,
        )
        .await;

        let ack = rig
            .dispatcher
            .submit(
                OperationKind::Merge,
                vec![pdf("a.pdf"), pdf("b.pdf")],
                HashMap::new(),
            )
            .await;
        let job_id = ack.job_id.unwrap();
        // The channel exists as soon as the client can learn the id.
        assert_eq!(rig.bus.open_job_channels(), 1);

        let mut rx = rig.bus.subscribe_job(&job_id);
        loop {
            match rx.recv().await {
                Ok(event) if event.is_terminal() => break,
                Ok(_) => {}
                Err(e) => panic!("stream ended before terminal event: {e}"),
            }
        }
        assert_eq!(rig.bus.open_job_channels(), 0);

        // A latecomer gets an already-ended stream, not a revived channel.
        let mut late = rig.bus.subscribe_job(&job_id);
        assert_eq!(rig.bus.open_job_channels(), 0);
        assert!(matches!(
            late.recv().await,
            Err(tokio::sync::broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_merge_with_one_input_rejected_synchronously() {
        let rig = rig(
            OperationRegistry::builder().register(Arc::new(EchoHandler {
                kind: OperationKind::Merge,
                label: "Merged PDF",
            })),
            4,
        )
        .await;
        let mut rx = rig.bus.subscribe();

        let ack = rig
            .dispatcher
            .submit(OperationKind::Merge, vec![pdf("only.pdf")], HashMap::new())
            .await;
        assert_eq!(ack.status, AckStatus::Error);
        assert_eq!(ack.message, "At least 2 PDF files are required for merging.");
        assert!(ack.job_id.is_some());
        assert_eq!(rig.dispatcher.tracker().live_count(), 0);

        // Exactly one error event, nothing after it.
        let event = rx.recv().await.unwrap();
        assert_eq!(event.status, JobStatus::Error);
        assert_eq!(
            event.message.as_deref(),
            Some("⚠️ At least 2 PDF files are required for merging.")
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_protect_password_mismatch_rejected() {
        let rig = rig(
            OperationRegistry::builder().register(Arc::new(EchoHandler {
                kind: OperationKind::Protect,
                label: "Protected PDF",
            })),
            4,
        )
        .await;

        let mut fields = HashMap::new();
        fields.insert("password".to_string(), "secret".to_string());
        fields.insert("confirm_password".to_string(), "secrets".to_string());
        let ack = rig
            .dispatcher
            .submit(OperationKind::Protect, vec![pdf("doc.pdf")], fields)
            .await;
        assert_eq!(ack.status, AckStatus::Error);
        assert_eq!(ack.message, "Passwords do not match.");
        assert_eq!(rig.dispatcher.tracker().live_count(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_kind_rejected() {
        let rig = rig(OperationRegistry::builder(), 4).await;
        let ack = rig
            .dispatcher
            .submit(OperationKind::Compress, vec![pdf("doc.pdf")], HashMap::new())
            .await;
        assert_eq!(ack.status, AckStatus::Error);
        assert!(ack.message.contains("No handler registered"));
    }

    #[tokio::test]
    async fn test_handler_failure_becomes_single_terminal_error() {
        let rig = rig(
            OperationRegistry::builder().register(Arc::new(FailingHandler)),
            4,
        )
        .await;

        let ack = rig
            .dispatcher
            .submit(OperationKind::Compress, vec![pdf("doc.pdf")], HashMap::new())
            .await;
        assert_eq!(ack.status, AckStatus::Processing);

        let mut rx = rig.bus.subscribe_job(&ack.job_id.unwrap());
        let event = rx.recv().await.unwrap();
        assert_eq!(event.status, JobStatus::Error);
        assert_eq!(
            event.message.as_deref(),
            Some("❌ Error compressing PDF: ghostscript exited with code 1")
        );
        assert!(matches!(
            rx.recv().await,
            Err(tokio::sync::broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_worker_pool_is_bounded() {
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let rig = rig(
            OperationRegistry::builder().register(Arc::new(SlowHandler {
                concurrent: Arc::clone(&concurrent),
                peak: Arc::clone(&peak),
            })),
            2,
        )
        .await;
        let mut rx = rig.bus.subscribe();

        for _ in 0..5 {
            let ack = rig
                .dispatcher
                .submit(OperationKind::Rotate, vec![pdf("doc.pdf")], HashMap::new())
                .await;
            assert_eq!(ack.status, AckStatus::Processing);
        }

        let mut terminals = 0;
        while terminals < 5 {
            if rx.recv().await.unwrap().is_terminal() {
                terminals += 1;
            }
        }
        assert!(peak.load(Ordering::SeqCst) <= 2, "pool cap exceeded");
    }
}
