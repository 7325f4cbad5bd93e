//! The handler contract between the job core and external collaborators.
//!
//! A handler owns the actual content transformation. The core guarantees it
//! is invoked at most once per job, with staged inputs and parsed options,
//! and converts anything it returns (or fails with) into exactly one
//! terminal event at the worker boundary.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use papermill_core::error::AppError;
use papermill_core::events::DownloadDescriptor;
use papermill_core::types::JobId;
use papermill_store::{Artifact, ArtifactStore};
use papermill_store::naming;

use crate::kind::OperationKind;
use crate::options::OperationOptions;
use crate::progress::JobProgress;

/// Failure inside an opaque transformation.
///
/// Carries the user-facing message verbatim; the worker boundary wraps it
/// into the terminal error event without retrying.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    /// User-facing description of what failed.
    pub message: String,
    /// Underlying cause, kept for logs.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HandlerError {
    /// Create a handler error from a message alone.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a handler error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<AppError> for HandlerError {
    fn from(err: AppError) -> Self {
        Self {
            message: err.message.clone(),
            source: Some(Box::new(err)),
        }
    }
}

/// Everything a handler needs to run one job.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// Correlation id; also the short id in every produced artifact name.
    pub job_id: JobId,
    /// Operation being executed.
    pub kind: OperationKind,
    /// Staged input artifacts, in submission order.
    pub inputs: Vec<Artifact>,
    /// Names the inputs were uploaded under, parallel to `inputs`.
    pub declared_names: Vec<String>,
    /// Parsed, validated options for this kind.
    pub options: OperationOptions,
    /// Progress emitter bound to this job.
    pub progress: JobProgress,
    /// Artifact store for outputs and scratch space.
    pub store: Arc<ArtifactStore>,
}

impl HandlerContext {
    /// Sanitized stem of the first declared input name, used as the base of
    /// output names. Falls back to the operation's wire name when the
    /// declared name sanitizes to nothing useful.
    pub fn base_name(&self) -> String {
        match self.declared_names.first() {
            Some(name) => naming::sanitize_stem(name),
            None => self.kind.wire_name().to_string(),
        }
    }
}

/// What a successful handler hands back to the worker.
///
/// The worker publishes the terminal success event from this; handlers
/// never emit terminal events themselves.
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    /// Success message, without the status marker.
    pub message: String,
    /// Produced artifact references.
    pub downloads: Vec<DownloadDescriptor>,
    /// Final narrative log line.
    pub log_entry: String,
}

/// One operation kind's transformation, supplied by an external collaborator.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// The kind this handler implements.
    fn kind(&self) -> OperationKind;

    /// Run the transformation. Invoked at most once per job.
    async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError>;
}
