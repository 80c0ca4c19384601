use std::process::Stdio;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, warn};

use super::{MediaPreference, Origin, SourceLocator};
use crate::config::ToolCommand;
use crate::process::ToolProcess;
use crate::stream::{StreamHandle, stdout_stream};
use crate::{Error, Result};

/// Resolves video pages through `yt-dlp`, streaming the media from its stdout.
#[derive(Debug, Clone)]
pub struct ExtractorOrigin {
    tool: ToolCommand,
}

impl ExtractorOrigin {
    pub fn new(tool: ToolCommand) -> Self {
        Self { tool }
    }

    fn build_args(url: &str, preference: MediaPreference) -> Vec<String> {
        vec![
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "-f".to_string(),
            preference.format_selector().to_string(),
            "-o".to_string(),
            "-".to_string(),
            url.to_string(),
        ]
    }
}

#[async_trait]
impl Origin for ExtractorOrigin {
    fn name(&self) -> &'static str {
        "extractor"
    }

    async fn open(&self, locator: &SourceLocator, preference: MediaPreference) -> Result<StreamHandle> {
        let args = Self::build_args(locator.as_str(), preference);
        let mut process = ToolProcess::spawn(&self.tool, &args, Stdio::null(), Stdio::piped())
            .map_err(|e| Error::origin(format!("failed to spawn {}: {}", self.tool.name(), e)))?;
        let stdout = process.take_stdout().map_err(|e| Error::origin(e.to_string()))?;
        debug!(tool = process.label(), pid = ?process.id(), "Extractor started");

        let on_eof = async move {
            let label = process.label().to_string();
            let exit = process.wait().await?;
            if exit.success() {
                Ok::<(), std::io::Error>(())
            } else {
                warn!(tool = %label, status = %exit.status, "Extractor failed");
                Err(Error::origin(exit.describe(&label)).into_io())
            }
        }
        .boxed();

        Ok(StreamHandle::new(self.name(), stdout_stream(stdout, on_eof))
            .with_content_type(Some(preference.content_type().to_string())))
    }
}
