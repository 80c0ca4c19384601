//! Origin stream provider.
//!
//! Turns a client-supplied locator into a validated [`SourceLocator`] and then
//! into an open [`StreamHandle`]. Validation always happens first and acquires
//! nothing.

mod extractor;
mod http;
mod locator;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

pub use extractor::ExtractorOrigin;
pub use http::HttpOrigin;
pub(crate) use locator::check_redirect_target;
pub use locator::{LocatorKind, LocatorPolicy, SourceLocator};

use crate::Result;
use crate::config::{OriginConfig, ToolCommand};
use crate::stream::StreamHandle;
use crate::utils::http_client::build_origin_client;

/// Which rendition to ask the origin for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaPreference {
    Video,
    Audio,
}

impl MediaPreference {
    /// Format selector for the extractor tool.
    pub fn format_selector(&self) -> &'static str {
        match self {
            Self::Video => "b[ext=mp4]/best[ext=mp4]/best",
            Self::Audio => "bestaudio/best",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Video => "video/mp4",
            Self::Audio => "application/octet-stream",
        }
    }
}

/// A source of media bytes.
#[async_trait]
pub trait Origin: Send + Sync {
    fn name(&self) -> &'static str;

    async fn open(&self, locator: &SourceLocator, preference: MediaPreference) -> Result<StreamHandle>;
}

/// Validates locators and dispatches them to the matching origin.
#[derive(Clone)]
pub struct OriginProvider {
    policy: LocatorPolicy,
    direct: Arc<dyn Origin>,
    extractor: Arc<dyn Origin>,
}

impl OriginProvider {
    pub fn new(config: &OriginConfig, yt_dlp: ToolCommand) -> Self {
        Self::with_origins(
            LocatorPolicy::from_config(config),
            Arc::new(HttpOrigin::new(build_origin_client(config))),
            Arc::new(ExtractorOrigin::new(yt_dlp)),
        )
    }

    pub fn with_origins(
        policy: LocatorPolicy,
        direct: Arc<dyn Origin>,
        extractor: Arc<dyn Origin>,
    ) -> Self {
        Self {
            policy,
            direct,
            extractor,
        }
    }

    pub fn policy(&self) -> &LocatorPolicy {
        &self.policy
    }

    /// Pure validation. Never touches the network.
    pub fn validate(&self, raw: &str) -> Result<SourceLocator> {
        self.policy.validate(raw)
    }

    /// Open a byte stream for an already validated locator.
    pub async fn open(
        &self,
        locator: &SourceLocator,
        preference: MediaPreference,
    ) -> Result<StreamHandle> {
        let origin = match locator.kind() {
            LocatorKind::Direct => &self.direct,
            LocatorKind::Extractor { .. } => &self.extractor,
        };
        debug!(origin = origin.name(), host = locator.host(), ?preference, "Opening origin");
        origin.open(locator, preference).await
    }
}

impl std::fmt::Debug for OriginProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginProvider")
            .field("policy", &self.policy)
            .field("direct", &self.direct.name())
            .field("extractor", &self.extractor.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;
    use bytes::Bytes;
    use futures::TryStreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    struct CountingOrigin {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Origin for CountingOrigin {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn open(&self, _: &SourceLocator, _: MediaPreference) -> Result<StreamHandle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(StreamHandle::new(
                "counting",
                futures::stream::iter(vec![Ok(Bytes::from_static(b"x"))]),
            ))
        }
    }

    async fn spawn_upstream() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/clip.mp4", get(|| async { ([("content-type", "video/mp4")], "abcdef") }))
            .route(
                "/missing",
                get(|| async { (axum::http::StatusCode::NOT_FOUND, "gone") }),
            )
            .route("/admin", get(|| async { "internal-secret" }))
            .route(
                "/hop",
                get(move || async move {
                    axum::response::Redirect::temporary(&format!("http://{addr}/admin"))
                }),
            );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn permissive() -> OriginConfig {
        OriginConfig {
            allow_private_hosts: true,
            ..OriginConfig::default()
        }
    }

    #[tokio::test]
    async fn test_dispatches_by_locator_kind() {
        let direct = Arc::new(CountingOrigin { calls: AtomicUsize::new(0) });
        let extractor = Arc::new(CountingOrigin { calls: AtomicUsize::new(0) });
        let provider = OriginProvider::with_origins(
            LocatorPolicy {
                allow_private_hosts: false,
                extractor_enabled: true,
            },
            direct.clone(),
            extractor.clone(),
        );

        let page = provider
            .validate("https://youtu.be/dQw4w9WgXcQ")
            .unwrap();
        provider.open(&page, MediaPreference::Audio).await.unwrap();
        let file = provider.validate("https://cdn.example.com/a.mp4").unwrap();
        provider.open(&file, MediaPreference::Video).await.unwrap();

        assert_eq!(direct.calls.load(Ordering::SeqCst), 1);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_http_origin_streams_body() {
        let addr = spawn_upstream().await;
        let provider = OriginProvider::new(&permissive(), ToolCommand::new("yt-dlp"));
        let locator = provider.validate(&format!("http://{addr}/clip.mp4")).unwrap();

        let handle = provider.open(&locator, MediaPreference::Video).await.unwrap();
        assert_eq!(handle.producer(), "http");
        assert_eq!(handle.content_type(), Some("video/mp4"));
        assert_eq!(handle.content_length(), Some(6));
        let body: Vec<Bytes> = handle.try_collect().await.unwrap();
        assert_eq!(body.concat(), b"abcdef");
    }

    #[tokio::test]
    async fn test_http_origin_rejects_error_status() {
        let addr = spawn_upstream().await;
        let provider = OriginProvider::new(&permissive(), ToolCommand::new("yt-dlp"));
        let locator = provider.validate(&format!("http://{addr}/missing")).unwrap();

        let err = provider.open(&locator, MediaPreference::Video).await.unwrap_err();
        assert!(matches!(err, crate::Error::OriginUnavailable(msg) if msg.contains("404")));
    }

    #[tokio::test]
    async fn test_redirect_to_private_host_is_refused() {
        let addr = spawn_upstream().await;
        // The first hop is accepted so only the redirect guard is exercised.
        let locator = LocatorPolicy {
            allow_private_hosts: true,
            extractor_enabled: false,
        }
        .validate(&format!("http://{addr}/hop"))
        .unwrap();

        let strict = HttpOrigin::new(build_origin_client(&OriginConfig::default()));
        let err = strict.open(&locator, MediaPreference::Video).await.unwrap_err();
        assert!(matches!(err, crate::Error::OriginUnavailable(_)), "{err}");

        let permissive = HttpOrigin::new(build_origin_client(&permissive()));
        let handle = permissive.open(&locator, MediaPreference::Video).await.unwrap();
        let body: Vec<Bytes> = handle.try_collect().await.unwrap();
        assert_eq!(body.concat(), b"internal-secret");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extractor_failure_is_terminal_stream_error() {
        let tool = ToolCommand::new("/bin/sh").with_prefix_args([
            "-c",
            "printf partial; echo 'ERROR: Video unavailable' >&2; exit 1",
            "yt-dlp",
        ]);
        let origin = ExtractorOrigin::new(tool);
        let locator = LocatorPolicy {
            allow_private_hosts: false,
            extractor_enabled: true,
        }
        .validate("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        .unwrap();

        let mut handle = origin.open(&locator, MediaPreference::Video).await.unwrap();
        let first = futures::StreamExt::next(&mut handle).await.unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"partial"));
        let err = futures::StreamExt::next(&mut handle).await.unwrap().unwrap_err();
        let err = crate::Error::from_stream_io(err, crate::Error::OriginUnavailable);
        assert!(matches!(err, crate::Error::OriginUnavailable(msg) if msg.contains("Video unavailable")));
        assert!(futures::StreamExt::next(&mut handle).await.is_none());
    }
}
