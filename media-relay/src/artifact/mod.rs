//! Temporary on-disk artifacts.
//!
//! An [`ArtifactStore`] owns one directory namespace (uploads, converted
//! output). Every file it hands out is an [`ArtifactRecord`] owned by exactly
//! one request and removed when that request is done with it.

mod record;
mod store;

pub use record::{ArtifactRecord, ArtifactState};
pub use store::ArtifactStore;
