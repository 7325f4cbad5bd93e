//! # papermill-core
//!
//! Core crate for PaperMill. Contains configuration schemas, typed
//! identifiers, progress event types, and the unified error system.
//!
//! This crate has **no** internal dependencies on other PaperMill crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
