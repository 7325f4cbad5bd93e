//! # papermill-api
//!
//! The HTTP and WebSocket surface: job submission, artifact downloads,
//! the progress stream, and the health check.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
