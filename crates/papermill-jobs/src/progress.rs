//! Progress event bus and per-job emitter.
//!
//! One global broadcast stream carries every event; a per-job channel keyed
//! by correlation id lets an observer follow a single job. Delivery is
//! best-effort: buffers are bounded and lagging receivers skip ahead.

use std::sync::Arc;
use std::sync::Mutex;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use papermill_core::events::{DownloadDescriptor, JobStatus, ProgressEvent};
use papermill_core::types::JobId;

/// Default per-channel broadcast buffer.
pub const DEFAULT_BUFFER: usize = 256;

/// Broadcast bus for [`ProgressEvent`]s.
///
/// Publishing is synchronous and never blocks; events for slow observers
/// are dropped by the broadcast channel rather than buffered indefinitely.
/// A job's dedicated channel is closed when its terminal event goes out,
/// which ends every per-job subscriber's stream.
#[derive(Debug)]
pub struct ProgressBus {
    all: broadcast::Sender<ProgressEvent>,
    jobs: DashMap<JobId, broadcast::Sender<ProgressEvent>>,
    buffer: usize,
}

impl ProgressBus {
    /// Create a bus with the given per-channel buffer size.
    pub fn new(buffer: usize) -> Self {
        let (all, _) = broadcast::channel(buffer);
        Self {
            all,
            jobs: DashMap::new(),
            buffer,
        }
    }

    /// Publish an event to the global stream and the owning job's channel.
    pub fn publish(&self, event: ProgressEvent) {
        if let Some(tx) = self.jobs.get(&event.job_id) {
            let _ = tx.send(event.clone());
        }
        let terminal = event.is_terminal();
        let job_id = event.job_id.clone();
        let _ = self.all.send(event);
        if terminal {
            // Dropping the sender closes every per-job receiver.
            self.jobs.remove(&job_id);
            debug!(job_id = %job_id, "Closed per-job progress channel");
        }
    }

    /// Subscribe to every job's events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.all.subscribe()
    }

    /// Open a job's dedicated channel ahead of its first event.
    ///
    /// The dispatcher calls this on acceptance, before the job id is
    /// handed to any client. Idempotent; the channel stays open until the
    /// terminal event closes it in [`publish`](Self::publish).
    pub fn open_job(&self, job_id: &JobId) {
        self.jobs
            .entry(job_id.clone())
            .or_insert_with(|| broadcast::channel(self.buffer).0);
    }

    /// Subscribe to one job's events. Subscribing to an unknown or already
    /// finished job yields a stream that is already closed, so a late
    /// observer ends immediately instead of waiting for events that will
    /// never come.
    pub fn subscribe_job(&self, job_id: &JobId) -> broadcast::Receiver<ProgressEvent> {
        match self.jobs.get(job_id) {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            }
        }
    }

    /// Number of jobs with an open per-job channel.
    pub fn open_job_channels(&self) -> usize {
        self.jobs.len()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

#[derive(Debug)]
struct EmitterState {
    last_progress: u8,
    terminal_sent: bool,
}

/// Per-job progress emitter handed to the running handler.
///
/// Enforces two disciplines at the source: progress values never regress
/// for the job, and nothing is published after the terminal event.
#[derive(Debug, Clone)]
pub struct JobProgress {
    bus: Arc<ProgressBus>,
    job_id: JobId,
    tool: String,
    state: Arc<Mutex<EmitterState>>,
}

impl JobProgress {
    /// Create an emitter for one job.
    pub fn new(bus: Arc<ProgressBus>, job_id: JobId, tool: impl Into<String>) -> Self {
        Self {
            bus,
            job_id,
            tool: tool.into(),
            state: Arc::new(Mutex::new(EmitterState {
                last_progress: 0,
                terminal_sent: false,
            })),
        }
    }

    /// Id of the job this emitter belongs to.
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Informational update with a message and completion percentage.
    pub fn update(&self, message: impl Into<String>, progress: u8) {
        let event = self
            .event(JobStatus::Processing)
            .with_message(message)
            .with_progress(progress);
        self.emit(event);
    }

    /// Informational update carrying message, percentage, and a log line.
    pub fn update_with_log(
        &self,
        message: impl Into<String>,
        progress: u8,
        entry: impl Into<String>,
    ) {
        let event = self
            .event(JobStatus::Processing)
            .with_message(message)
            .with_progress(progress)
            .with_log_entry(entry);
        self.emit(event);
    }

    /// Narrative log line with no message or percentage.
    pub fn log(&self, entry: impl Into<String>) {
        self.emit(self.event(JobStatus::Processing).with_log_entry(entry));
    }

    /// Non-fatal warning log line.
    pub fn warn(&self, entry: impl Into<String>) {
        self.emit(self.event(JobStatus::Warning).with_log_entry(entry));
    }

    /// Terminal success carrying the produced download descriptors.
    pub fn succeed(
        &self,
        message: impl Into<String>,
        downloads: Vec<DownloadDescriptor>,
        entry: impl Into<String>,
    ) {
        let event = self
            .event(JobStatus::Success)
            .with_message(format!("✅ {}", message.into()))
            .with_downloads(downloads)
            .with_log_entry(entry);
        self.emit(event);
    }

    /// Terminal failure.
    pub fn fail(&self, message: impl Into<String>, entry: impl Into<String>) {
        let event = self
            .event(JobStatus::Error)
            .with_message(format!("❌ {}", message.into()))
            .with_log_entry(entry);
        self.emit(event);
    }

    fn event(&self, status: JobStatus) -> ProgressEvent {
        ProgressEvent::new(self.job_id.clone(), self.tool.clone(), status)
    }

    fn emit(&self, mut event: ProgressEvent) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.terminal_sent {
            warn!(
                job_id = %self.job_id,
                status = event.status.as_str(),
                "Dropping event emitted after terminal"
            );
            return;
        }
        if let Some(progress) = event.progress {
            let clamped = progress.max(state.last_progress);
            state.last_progress = clamped;
            event.progress = Some(clamped);
        }
        if event.is_terminal() {
            state.terminal_sent = true;
        }
        drop(state);
        self.bus.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_id(token: &str) -> JobId {
        token.parse().expect("valid id")
    }

    fn drain(rx: &mut broadcast::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_global_and_job_subscribers_both_receive() {
        let bus = Arc::new(ProgressBus::default());
        let id = job_id("11111111");
        let other_id = job_id("22222222");
        bus.open_job(&id);
        bus.open_job(&other_id);
        let mut all = bus.subscribe();
        let mut mine = bus.subscribe_job(&id);
        let mut other = bus.subscribe_job(&other_id);

        let emitter = JobProgress::new(Arc::clone(&bus), id.clone(), "merge");
        emitter.update("Working...", 10);

        assert_eq!(drain(&mut all).len(), 1);
        assert_eq!(drain(&mut mine).len(), 1);
        assert!(drain(&mut other).is_empty());
    }

    #[tokio::test]
    async fn test_progress_never_regresses() {
        let bus = Arc::new(ProgressBus::default());
        let id = job_id("11111111");
        let mut rx = bus.subscribe();

        let emitter = JobProgress::new(Arc::clone(&bus), id, "split");
        emitter.update("a", 40);
        emitter.update("b", 20);
        emitter.update("c", 60);

        let progress: Vec<u8> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| e.progress)
            .collect();
        assert_eq!(progress, vec![40, 40, 60]);
    }

    #[tokio::test]
    async fn test_exactly_one_terminal_event() {
        let bus = Arc::new(ProgressBus::default());
        let id = job_id("11111111");
        let mut rx = bus.subscribe();

        let emitter = JobProgress::new(Arc::clone(&bus), id, "merge");
        emitter.succeed("PDFs merged successfully!", Vec::new(), "done");
        emitter.fail("should be dropped", "late");
        emitter.log("also dropped");

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, JobStatus::Success);
        assert_eq!(
            events[0].message.as_deref(),
            Some("✅ PDFs merged successfully!")
        );
    }

    #[tokio::test]
    async fn test_terminal_closes_job_channel() {
        let bus = Arc::new(ProgressBus::default());
        let id = job_id("11111111");
        bus.open_job(&id);
        let mut mine = bus.subscribe_job(&id);
        assert_eq!(bus.open_job_channels(), 1);

        let emitter = JobProgress::new(Arc::clone(&bus), id, "merge");
        emitter.fail("Error merging PDFs: boom", "boom");

        assert_eq!(bus.open_job_channels(), 0);
        // Buffered terminal event is still readable, then the stream ends.
        assert!(mine.recv().await.is_ok());
        assert!(matches!(
            mine.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_late_subscription_neither_reopens_nor_hangs() {
        let bus = Arc::new(ProgressBus::default());
        let id = job_id("11111111");
        bus.open_job(&id);

        let emitter = JobProgress::new(Arc::clone(&bus), id.clone(), "merge");
        emitter.fail("Error merging PDFs: boom", "boom");
        assert_eq!(bus.open_job_channels(), 0);

        // A subscriber arriving after the terminal event must not bring
        // the channel back, and its stream must end at once.
        let mut late = bus.subscribe_job(&id);
        assert_eq!(bus.open_job_channels(), 0);
        assert!(matches!(
            late.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_unknown_job_subscription_is_closed() {
        let bus = ProgressBus::default();
        let mut rx = bus.subscribe_job(&job_id("99999999"));
        assert_eq!(bus.open_job_channels(), 0);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = ProgressBus::default();
        bus.publish(ProgressEvent::new(
            job_id("33333333"),
            "compress",
            JobStatus::Processing,
        ));
    }
}
