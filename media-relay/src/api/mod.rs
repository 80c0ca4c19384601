//! HTTP surface.
//!
//! Thin handlers over the [`Orchestrator`](crate::pipeline::Orchestrator):
//! each route parses its input, starts a pipeline run and returns the
//! streamed attachment or a JSON error.

pub mod error;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
