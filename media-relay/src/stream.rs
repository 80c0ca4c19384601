//! Exclusively owned byte streams between pipeline stages.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, Stream, StreamExt};
use tokio::process::ChildStdout;
use tokio_util::io::ReaderStream;

/// An ordered byte channel from one producer to one consumer.
///
/// The handle is moved, never shared. Once the underlying stream yields an
/// error the handle is closed and yields nothing further.
pub struct StreamHandle {
    producer: String,
    content_length: Option<u64>,
    content_type: Option<String>,
    inner: BoxStream<'static, io::Result<Bytes>>,
    pending: Option<Bytes>,
    closed: bool,
}

impl StreamHandle {
    pub fn new<S>(producer: impl Into<String>, stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            producer: producer.into(),
            content_length: None,
            content_type: None,
            inner: stream.boxed(),
            pending: None,
            closed: false,
        }
    }

    pub fn with_content_length(mut self, len: Option<u64>) -> Self {
        self.content_length = len;
        self
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    /// Identity of the producing stage, for logs.
    pub fn producer(&self) -> &str {
        &self.producer
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn is_open(&self) -> bool {
        !self.closed || self.pending.is_some()
    }

    /// Read ahead until the first non-empty chunk.
    ///
    /// Failures that happen before any byte exists surface here instead of
    /// after a response head has been committed. The chunk is kept and yielded
    /// first. An empty stream primes successfully.
    pub async fn prime(&mut self) -> io::Result<()> {
        if self.pending.is_some() || self.closed {
            return Ok(());
        }
        loop {
            match self.inner.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => {
                    self.pending = Some(chunk);
                    return Ok(());
                }
                Some(Err(e)) => {
                    self.closed = true;
                    return Err(e);
                }
                None => {
                    self.closed = true;
                    return Ok(());
                }
            }
        }
    }
}

impl Stream for StreamHandle {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(chunk) = self.pending.take() {
            return Poll::Ready(Some(Ok(chunk)));
        }
        if self.closed {
            return Poll::Ready(None);
        }
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(e))) => {
                self.closed = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.closed = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("producer", &self.producer)
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Stream a child's stdout, then run `on_eof` once stdout ends.
///
/// `on_eof` owns the child (and anything else the process needs), so dropping
/// the stream before the end drops the child, which kills it. An error from
/// `on_eof` becomes the final item of the stream.
pub(crate) fn stdout_stream(
    stdout: ChildStdout,
    on_eof: BoxFuture<'static, io::Result<()>>,
) -> BoxStream<'static, io::Result<Bytes>> {
    struct State {
        reader: ReaderStream<ChildStdout>,
        on_eof: Option<BoxFuture<'static, io::Result<()>>>,
    }

    let state = State {
        reader: ReaderStream::new(stdout),
        on_eof: Some(on_eof),
    };

    futures::stream::unfold(state, |mut state| async move {
        let on_eof = state.on_eof.take()?;
        match state.reader.next().await {
            Some(Ok(chunk)) => {
                state.on_eof = Some(on_eof);
                Some((Ok(chunk), state))
            }
            Some(Err(e)) => Some((Err(e), state)),
            None => match on_eof.await {
                Ok(()) => None,
                Err(e) => Some((Err(e), state)),
            },
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn chunks(items: Vec<io::Result<&'static [u8]>>) -> StreamHandle {
        let stream = futures::stream::iter(
            items
                .into_iter()
                .map(|item| item.map(Bytes::from_static))
                .collect::<Vec<_>>(),
        );
        StreamHandle::new("test", stream)
    }

    #[tokio::test]
    async fn test_yields_in_order() {
        let handle = chunks(vec![Ok(b"ab"), Ok(b"cd"), Ok(b"e")]);
        let collected: Vec<Bytes> = handle.try_collect().await.unwrap();
        assert_eq!(collected.concat(), b"abcde");
    }

    #[tokio::test]
    async fn test_closed_after_error() {
        let mut handle = chunks(vec![
            Ok(b"ab"),
            Err(io::Error::other("reset")),
            Ok(b"never"),
        ]);
        assert_eq!(handle.next().await.unwrap().unwrap(), Bytes::from_static(b"ab"));
        assert!(handle.next().await.unwrap().is_err());
        assert!(handle.next().await.is_none());
        assert!(!handle.is_open());
    }

    #[tokio::test]
    async fn test_prime_keeps_first_chunk() {
        let mut handle = chunks(vec![Ok(b""), Ok(b"first"), Ok(b"second")]);
        handle.prime().await.unwrap();
        assert!(handle.is_open());
        let collected: Vec<Bytes> = handle.try_collect().await.unwrap();
        assert_eq!(collected.concat(), b"firstsecond");
    }

    #[tokio::test]
    async fn test_prime_surfaces_early_error() {
        let mut handle = chunks(vec![Err(io::Error::other("refused"))]);
        let err = handle.prime().await.unwrap_err();
        assert_eq!(err.to_string(), "refused");
        assert!(handle.next().await.is_none());
    }

    #[tokio::test]
    async fn test_prime_on_empty_stream() {
        let mut handle = chunks(vec![]);
        handle.prime().await.unwrap();
        assert!(handle.next().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_stream_reports_exit_failure() {
        use futures::FutureExt;
        use std::process::Stdio;

        let mut child = process_utils::tokio_command("/bin/sh")
            .args(["-c", "printf hello; exit 3"])
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();
        let on_eof = async move {
            let status = child.wait().await?;
            if status.success() {
                Ok::<(), io::Error>(())
            } else {
                Err(io::Error::other(format!("exited with {status}")))
            }
        }
        .boxed();

        let mut stream = stdout_stream(stdout, on_eof);
        let mut body = Vec::new();
        let mut failure = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => body.extend_from_slice(&chunk),
                Err(e) => failure = Some(e),
            }
        }
        assert_eq!(body, b"hello");
        assert!(failure.unwrap().to_string().contains("exited with"));
    }
}
