//! # papermill-jobs
//!
//! The job core: operation kinds and options, the handler contract and
//! registry, the progress event bus, the bounded job dispatcher, and the
//! retention sweeper.

pub mod dispatcher;
pub mod handler;
pub mod kind;
pub mod options;
pub mod progress;
pub mod registry;
pub mod sweeper;
pub mod tracker;

pub use dispatcher::{AckStatus, JobDispatcher, SubmitAck, UploadedFile};
pub use handler::{HandlerContext, HandlerError, HandlerOutcome, OperationHandler};
pub use kind::{OperationKind, OutputShape};
pub use options::OperationOptions;
pub use progress::{JobProgress, ProgressBus};
pub use registry::{OperationRegistry, RegistryBuilder};
pub use sweeper::RetentionSweeper;
pub use tracker::JobTracker;
