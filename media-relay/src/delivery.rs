//! Delivery sink.
//!
//! Relays a stream or a finished artifact to the client as an attachment and
//! reports exactly one [`DeliveryOutcome`] per response body.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::artifact::ArtifactRecord;
use crate::stream::StreamHandle;
use crate::{Error, Result};

/// How a delivery attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Every byte reached the response body.
    Completed { bytes: u64 },
    /// The source failed mid-body.
    Failed { bytes: u64, error: String },
    /// The body was dropped before the end, i.e. the client went away.
    Aborted { bytes: u64 },
}

impl DeliveryOutcome {
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Completed { bytes } | Self::Failed { bytes, .. } | Self::Aborted { bytes } => {
                *bytes
            }
        }
    }
}

/// Receives the outcome once the body is finished.
pub type OnFinish = Box<dyn FnOnce(DeliveryOutcome) + Send + 'static>;

/// Response body that counts bytes and signals completion exactly once.
///
/// The source is dropped before the signal fires, so whatever the signal
/// cleans up is no longer in use.
pub struct DeliveryBody {
    source: Option<StreamHandle>,
    bytes: u64,
    on_finish: Option<OnFinish>,
}

impl DeliveryBody {
    pub fn new(source: StreamHandle, on_finish: OnFinish) -> Self {
        Self {
            source: Some(source),
            bytes: 0,
            on_finish: Some(on_finish),
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes
    }

    fn finish(&mut self, outcome: DeliveryOutcome) {
        self.source.take();
        if let Some(on_finish) = self.on_finish.take() {
            on_finish(outcome);
        }
    }
}

impl Stream for DeliveryBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(source) = self.source.as_mut() else {
            return Poll::Ready(None);
        };
        match source.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                self.bytes += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                let bytes = self.bytes;
                self.finish(DeliveryOutcome::Failed {
                    bytes,
                    error: e.to_string(),
                });
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                let bytes = self.bytes;
                self.finish(DeliveryOutcome::Completed { bytes });
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for DeliveryBody {
    fn drop(&mut self) {
        if self.on_finish.is_some() {
            let bytes = self.bytes;
            self.finish(DeliveryOutcome::Aborted { bytes });
        }
    }
}

impl fmt::Debug for DeliveryBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryBody")
            .field("source", &self.source)
            .field("bytes", &self.bytes)
            .field("finished", &self.on_finish.is_none())
            .finish()
    }
}

/// `attachment; filename="<name>"`, with characters that cannot appear in a
/// quoted ASCII header value replaced.
pub fn content_disposition(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn attachment_headers(filename: &str, content_type: &str, content_length: Option<u64>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(filename));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Some(len) = content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    headers
}

/// Relay a live stream as an attachment of type `content_type`.
///
/// The body pulls from `source` only as fast as the client reads.
pub fn stream_response(
    source: StreamHandle,
    filename: &str,
    content_type: &str,
    on_finish: OnFinish,
) -> Response {
    let headers = attachment_headers(filename, content_type, source.content_length());
    debug!(producer = source.producer(), filename, content_type, "Delivering stream");

    let mut response = Response::new(Body::from_stream(DeliveryBody::new(source, on_finish)));
    *response.status_mut() = StatusCode::OK;
    *response.headers_mut() = headers;
    response
}

/// Open a completed artifact for streaming from disk, with its length set.
pub async fn open_artifact(record: &ArtifactRecord) -> Result<StreamHandle> {
    let file = tokio::fs::File::open(record.path())
        .await
        .map_err(|e| Error::io_path("opening artifact", record.path(), e))?;
    let len = match record.len() {
        Some(len) => len,
        None => file
            .metadata()
            .await
            .map_err(|e| Error::io_path("inspecting artifact", record.path(), e))?
            .len(),
    };

    Ok(StreamHandle::new("artifact", ReaderStream::new(file)).with_content_length(Some(len)))
}
