use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::{MediaPreference, Origin, SourceLocator};
use crate::stream::StreamHandle;
use crate::{Error, Result};

/// Fetches plain media URLs with one GET request.
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    client: reqwest::Client,
}

impl HttpOrigin {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn open(&self, locator: &SourceLocator, _preference: MediaPreference) -> Result<StreamHandle> {
        let response = self
            .client
            .get(locator.url().clone())
            .send()
            .await
            .map_err(|e| Error::origin(format!("request to {} failed: {}", locator.host(), e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::origin(format!(
                "{} responded with HTTP {}",
                locator.host(),
                status
            )));
        }

        let content_length = response.content_length();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        debug!(
            host = locator.host(),
            %status,
            ?content_length,
            ?content_type,
            "Origin response received"
        );

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(StreamHandle::new(self.name(), stream)
            .with_content_length(content_length)
            .with_content_type(content_type))
    }
}
