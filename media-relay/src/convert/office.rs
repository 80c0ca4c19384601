use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::artifact::ArtifactRecord;
use crate::config::ToolCommand;
use crate::transcode::run_tool;
use crate::{Error, Result};

/// Converts office documents to PDF with a headless office suite.
///
/// The suite names its output after the input (`<outdir>/<stem>.pdf`), so the
/// output record must be a sibling of the input record.
#[derive(Debug, Clone)]
pub struct OfficeConverter {
    tool: ToolCommand,
    timeout: Duration,
}

impl OfficeConverter {
    pub fn new(tool: ToolCommand, timeout: Duration) -> Self {
        Self { tool, timeout }
    }

    fn build_args(profile_url: &str, outdir: &Path, input: &Path) -> Vec<String> {
        vec![
            "--headless".to_string(),
            "--norestore".to_string(),
            format!("-env:UserInstallation={profile_url}"),
            "--convert-to".to_string(),
            "pdf".to_string(),
            "--outdir".to_string(),
            outdir.to_string_lossy().into_owned(),
            input.to_string_lossy().into_owned(),
        ]
    }

    pub async fn convert(&self, input: &Path, output: &mut ArtifactRecord) -> Result<u64> {
        let outdir = output
            .path()
            .parent()
            .ok_or_else(|| Error::Other("output artifact has no parent directory".to_string()))?
            .to_path_buf();
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Other("upload path has no file stem".to_string()))?;
        if output.path() != outdir.join(format!("{stem}.pdf")) {
            return Err(Error::Other(format!(
                "output {} does not match the converter's naming for {}",
                output.path().display(),
                input.display()
            )));
        }

        // A private profile per conversion; concurrent runs sharing one
        // profile block each other.
        let profile = tempfile::Builder::new()
            .prefix("media-relay-office-")
            .tempdir()
            .map_err(|e| Error::io_path("creating office profile", &std::env::temp_dir(), e))?;
        let profile_url = url::Url::from_directory_path(profile.path())
            .map_err(|_| Error::Other("office profile path is not absolute".to_string()))?;

        let args = Self::build_args(profile_url.as_str(), &outdir, input);
        output.mark_writing();
        run_tool(&self.tool, &args, self.timeout).await?;

        let len = output.finalize().await?;
        debug!(output = %output.path().display(), bytes = len, "Office document converted");
        Ok(len)
    }
}
