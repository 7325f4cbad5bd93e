//! Progress event types broadcast to observers.
//!
//! Events are immutable once constructed. The wire shape is fixed: optional
//! fields are omitted entirely rather than serialized as null, and the
//! download descriptor's display label serializes under the `type` key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::JobId;

/// Status carried by a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// The job is running; informational update.
    Processing,
    /// The job is running but something noteworthy happened.
    Warning,
    /// Terminal: the job failed.
    Error,
    /// Terminal: the job completed and produced artifacts.
    Success,
}

impl JobStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Success => "success",
        }
    }

    /// Whether this status ends the job's event stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error | Self::Success)
    }
}

/// One downloadable artifact reference on a terminal success event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadDescriptor {
    /// Logical display name.
    pub name: String,
    /// Relative download reference, e.g. `/download/report_merged_1a2b3c4d.pdf`.
    pub url: String,
    /// Human display label, e.g. "Merged PDF" or "All Pages (ZIP)".
    #[serde(rename = "type")]
    pub type_label: String,
    /// On-disk file name; equal to `name` for flat outputs.
    pub filename: String,
}

impl DownloadDescriptor {
    /// Build a descriptor whose filename matches its display name.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        type_label: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            filename: name.clone(),
            name,
            url: url.into(),
            type_label: type_label.into(),
        }
    }
}

/// A structured status update for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Correlation id of the job that produced the event.
    pub job_id: JobId,
    /// Event status.
    pub status: JobStatus,
    /// Human-readable message shown to the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Completion percentage, 0-100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Append-only narrative line for the job log panel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_entry: Option<String>,
    /// Wire tag of the operation kind that produced the event.
    pub tool: String,
    /// Produced artifact references; present only on terminal success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads: Option<Vec<DownloadDescriptor>>,
    /// When the event was published.
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Create an event with no optional fields set.
    pub fn new(job_id: JobId, tool: impl Into<String>, status: JobStatus) -> Self {
        Self {
            job_id,
            status,
            message: None,
            progress: None,
            log_entry: None,
            tool: tool.into(),
            downloads: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a user-facing message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach a completion percentage, clamped to 100.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    /// Attach a narrative log line.
    pub fn with_log_entry(mut self, entry: impl Into<String>) -> Self {
        self.log_entry = Some(entry.into());
        self
    }

    /// Attach download descriptors for a terminal success event.
    pub fn with_downloads(mut self, downloads: Vec<DownloadDescriptor>) -> Self {
        self.downloads = Some(downloads);
        self
    }

    /// Whether this event ends the job's stream.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_id() -> JobId {
        "0badcafe".parse().expect("valid id")
    }

    #[test]
    fn test_status_terminality() {
        assert!(!JobStatus::Processing.is_terminal());
        assert!(!JobStatus::Warning.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(JobStatus::Success.is_terminal());
    }

    #[test]
    fn test_optional_fields_omitted() {
        let event = ProgressEvent::new(job_id(), "merge", JobStatus::Processing);
        let json = serde_json::to_value(&event).expect("serialize");
        let obj = json.as_object().expect("object");
        assert!(!obj.contains_key("message"));
        assert!(!obj.contains_key("progress"));
        assert!(!obj.contains_key("log_entry"));
        assert!(!obj.contains_key("downloads"));
        assert_eq!(obj["status"], "processing");
        assert_eq!(obj["tool"], "merge");
        assert_eq!(obj["job_id"], "0badcafe");
    }

    #[test]
    fn test_download_serializes_type_key() {
        let event = ProgressEvent::new(job_id(), "merge", JobStatus::Success)
            .with_message("done")
            .with_downloads(vec![DownloadDescriptor::new(
                "report_merged_0badcafe.pdf",
                "/download/report_merged_0badcafe.pdf",
                "Merged PDF",
            )]);
        let json = serde_json::to_value(&event).expect("serialize");
        let entry = &json["downloads"][0];
        assert_eq!(entry["type"], "Merged PDF");
        assert_eq!(entry["name"], "report_merged_0badcafe.pdf");
        assert_eq!(entry["filename"], "report_merged_0badcafe.pdf");
    }

    #[test]
    fn test_progress_clamped() {
        let event = ProgressEvent::new(job_id(), "split", JobStatus::Processing).with_progress(250);
        assert_eq!(event.progress, Some(100));
    }
}
