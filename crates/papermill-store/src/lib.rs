//! # papermill-store
//!
//! Storage areas, the artifact naming scheme, and the artifact store.
//! Everything jobs write to disk goes through this crate; the retention
//! sweeper walks the same area roots to reclaim it later.

pub mod archive;
pub mod area;
pub mod artifact;
pub mod naming;
pub mod store;

pub use area::StorageArea;
pub use artifact::Artifact;
pub use store::{ArtifactStore, BatchDir, OutputSlot};
