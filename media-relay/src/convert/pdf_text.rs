use std::path::Path;
use std::time::Duration;

use tracing::debug;

use super::docx;
use crate::artifact::ArtifactRecord;
use crate::config::ToolCommand;
use crate::transcode::run_tool;
use crate::{Error, Result};

/// Converts a PDF to DOCX by extracting its text.
///
/// Only the text survives: layout, images and fonts are dropped.
#[derive(Debug, Clone)]
pub struct PdfToDocxConverter {
    pdftotext: ToolCommand,
    timeout: Duration,
}

impl PdfToDocxConverter {
    pub fn new(pdftotext: ToolCommand, timeout: Duration) -> Self {
        Self { pdftotext, timeout }
    }

    fn build_args(input: &Path) -> Vec<String> {
        vec![
            "-enc".to_string(),
            "UTF-8".to_string(),
            "-layout".to_string(),
            input.to_string_lossy().into_owned(),
            "-".to_string(),
        ]
    }

    /// Extract the document text. Pages are separated by form feeds.
    pub async fn extract_text(&self, input: &Path) -> Result<String> {
        let stdout = run_tool(&self.pdftotext, &Self::build_args(input), self.timeout).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    pub async fn convert(&self, input: &Path, output: &mut ArtifactRecord) -> Result<u64> {
        let text = self.extract_text(input).await?;
        debug!(chars = text.len(), "PDF text extracted");

        output.mark_writing();
        let path = output.path().to_path_buf();
        let len = tokio::task::spawn_blocking(move || docx::write_docx(&text, &path))
            .await
            .map_err(|e| Error::Other(format!("DOCX writer task failed: {e}")))??;
        output.mark_complete(len);
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_write_text_to_stdout() {
        let args = PdfToDocxConverter::build_args(Path::new("/srv/uploads/a.pdf"));
        assert_eq!(args, vec!["-enc", "UTF-8", "-layout", "/srv/uploads/a.pdf", "-"]);
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::artifact::{ArtifactState, ArtifactStore};
        use std::io::Read;
        use tempfile::TempDir;

        fn converter(script: &str) -> PdfToDocxConverter {
            PdfToDocxConverter::new(
                ToolCommand::new("/bin/sh").with_prefix_args(["-c", script, "pdftotext"]),
                Duration::from_secs(10),
            )
        }

        #[tokio::test]
        async fn test_converts_text_to_docx() {
            let temp = TempDir::new().unwrap();
            let store = ArtifactStore::open(temp.path()).await.unwrap();
            let mut output = store.allocate("converted", "docx", "req");

            let len = converter(r"printf 'Quarterly report\n\fAppendix\n'")
                .convert(Path::new("/unused.pdf"), &mut output)
                .await
                .unwrap();
            assert!(len > 0);
            assert_eq!(output.state(), ArtifactState::Complete);

            let file = std::fs::File::open(output.path()).unwrap();
            let mut archive = zip::ZipArchive::new(file).unwrap();
            let mut document = String::new();
            archive
                .by_name("word/document.xml")
                .unwrap()
                .read_to_string(&mut document)
                .unwrap();
            assert!(document.contains("Quarterly report"));
            assert!(document.contains(r#"<w:br w:type="page"/>"#));
            assert!(document.contains("Appendix"));
        }

        #[tokio::test]
        async fn test_extraction_failure_writes_nothing() {
            let temp = TempDir::new().unwrap();
            let store = ArtifactStore::open(temp.path()).await.unwrap();
            let mut output = store.allocate("converted", "docx", "req");

            let err = converter("echo 'Syntax Error: missing trailer dictionary' >&2; exit 1")
                .convert(Path::new("/corrupt.pdf"), &mut output)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::TranscodeFailure(msg) if msg.contains("trailer dictionary")));
            assert!(!output.exists().await);
        }
    }
}
