//! Fetch, transcode and deliver remote media and documents.
//!
//! A request moves through validation, fetch, an optional external
//! transformation and delivery. Every temporary file it creates is owned by
//! its [`pipeline::PipelineRun`] and removed on every exit path, including a
//! client that disconnects mid-stream.

pub mod api;
pub mod artifact;
pub mod config;
pub mod convert;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod origin;
pub mod pipeline;
pub mod process;
pub mod stream;
pub mod transcode;
pub mod utils;

pub use error::{Error, Result};
