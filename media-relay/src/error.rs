//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// The client supplied a locator that failed validation. No resources were acquired.
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    /// The multipart request did not carry a usable file.
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    /// Network or remote failure while fetching from the origin.
    #[error("Origin unavailable: {0}")]
    OriginUnavailable(String),

    /// The external transformation process failed or rejected its input.
    #[error("Transcode failed: {0}")]
    TranscodeFailure(String),

    /// The client went away while the response was being written.
    #[error("Delivery aborted after {bytes} bytes")]
    DeliveryAborted { bytes: u64 },

    /// Removing a temporary artifact failed. Logged, never sent to the client.
    #[error("Cleanup failed for {path}: {source}")]
    CleanupFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("IO error while {op} {path}: {source}")]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Server(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn invalid_locator(msg: impl Into<String>) -> Self {
        Self::InvalidLocator(msg.into())
    }

    pub fn origin(msg: impl Into<String>) -> Self {
        Self::OriginUnavailable(msg.into())
    }

    pub fn transcode(msg: impl Into<String>) -> Self {
        Self::TranscodeFailure(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Carry this error through an `io::Error` channel (a byte stream item).
    pub fn into_io(self) -> std::io::Error {
        std::io::Error::other(self)
    }

    /// Recover an error that travelled through a byte stream.
    ///
    /// Errors created by [`into_io`](Self::into_io) come back unchanged; any
    /// other IO error is wrapped with `wrap`.
    pub fn from_stream_io(err: std::io::Error, wrap: impl FnOnce(String) -> Self) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<Self>()) {
            return wrap(err.to_string());
        }
        let message = err.to_string();
        match err.into_inner().map(|inner| inner.downcast::<Self>()) {
            Some(Ok(ours)) => *ours,
            _ => wrap(message),
        }
    }

    /// Whether the failure was caused by the request itself rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidLocator(_) | Self::InvalidUpload(_))
    }
}
