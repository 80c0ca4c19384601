//! Transcode stage.
//!
//! Runs an origin stream through ffmpeg, either into an artifact on disk or
//! straight back out as a new [`StreamHandle`]. Also hosts the one-shot tool
//! runner used by the document converters.

mod job;
mod tool;

use futures::FutureExt;
use tracing::{debug, info};

pub use job::{JobState, TranscodeJob};
pub use tool::run_tool;

use crate::Result;
use crate::artifact::ArtifactRecord;
use crate::config::{ToolCommand, ToolsConfig};
use crate::stream::{StreamHandle, stdout_stream};

/// Output formats the transcoder can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Mp3,
}

impl TargetFormat {
    /// ffmpeg encoder.
    pub fn codec(&self) -> &'static str {
        match self {
            Self::Mp3 => "libmp3lame",
        }
    }

    /// ffmpeg muxer, required when writing to a pipe.
    pub fn muxer(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
        }
    }
}

/// ffmpeg wrapper.
#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg: ToolCommand,
    bitrate: Option<String>,
}

impl Transcoder {
    pub fn new(ffmpeg: ToolCommand, bitrate: Option<String>) -> Self {
        Self { ffmpeg, bitrate }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(config.ffmpeg.clone(), config.mp3_bitrate.clone())
    }

    fn build_args(&self, format: TargetFormat, output: &str) -> Vec<String> {
        let mut args: Vec<String> = [
            "-y",
            "-hide_banner",
            "-nostats",
            "-loglevel",
            "error",
            "-i",
            "pipe:0",
            "-vn",
            "-c:a",
            format.codec(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if let Some(bitrate) = &self.bitrate {
            args.push("-b:a".to_string());
            args.push(bitrate.clone());
        }

        args.push("-f".to_string());
        args.push(format.muxer().to_string());
        args.push(output.to_string());
        args
    }

    /// Transcode `input` into `output`, returning once the artifact is
    /// complete. Returns the artifact length.
    ///
    /// On failure the artifact may hold partial output; deleting it is the
    /// owner's job.
    pub async fn to_artifact(
        &self,
        input: StreamHandle,
        format: TargetFormat,
        output: &mut ArtifactRecord,
    ) -> Result<u64> {
        let path = output.path().to_string_lossy().into_owned();
        let args = self.build_args(format, &path);

        output.mark_writing();
        let (job, _) = TranscodeJob::spawn(&self.ffmpeg, &args, input, false)?;
        job.finish().await?;

        let len = output.finalize().await?;
        info!(path = %path, bytes = len, "Transcoded to artifact");
        Ok(len)
    }

    /// Transcode `input` on the fly. The returned stream ends with an error if
    /// ffmpeg fails; dropping it kills ffmpeg.
    pub fn to_stream(&self, input: StreamHandle, format: TargetFormat) -> Result<StreamHandle> {
        let args = self.build_args(format, "pipe:1");
        let (job, stdout) = TranscodeJob::spawn(&self.ffmpeg, &args, input, true)?;
        let stdout = stdout.ok_or_else(|| crate::Error::transcode("ffmpeg stdout not captured"))?;
        debug!(format = ?format, "Streaming transcode started");

        let on_eof = async move { job.finish().await.map_err(crate::Error::into_io) }.boxed();
        Ok(
            StreamHandle::new(self.ffmpeg.name().to_string(), stdout_stream(stdout, on_eof))
                .with_content_type(Some(format.content_type().to_string())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mp3_args() {
        let transcoder = Transcoder::new(ToolCommand::new("ffmpeg"), Some("192k".to_string()));
        let args = transcoder.build_args(TargetFormat::Mp3, "/tmp/out.mp3");
        assert_eq!(
            args,
            vec![
                "-y", "-hide_banner", "-nostats", "-loglevel", "error", "-i", "pipe:0", "-vn",
                "-c:a", "libmp3lame", "-b:a", "192k", "-f", "mp3", "/tmp/out.mp3",
            ]
        );
    }

    #[test]
    fn test_args_without_bitrate() {
        let transcoder = Transcoder::new(ToolCommand::new("ffmpeg"), None);
        let args = transcoder.build_args(TargetFormat::Mp3, "pipe:1");
        assert!(!args.contains(&"-b:a".to_string()));
        assert_eq!(args.last().unwrap(), "pipe:1");
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::artifact::{ArtifactState, ArtifactStore};
        use crate::Error;
        use bytes::Bytes;
        use futures::{StreamExt, TryStreamExt};
        use tempfile::TempDir;

        /// Copies stdin to the last argument (a path or `pipe:1`).
        const FAKE_FFMPEG: &str = r#"for last; do :; done
if [ "$last" = "pipe:1" ]; then exec cat; else exec cat > "$last"; fi"#;

        fn fake(script: &str) -> Transcoder {
            let tool = ToolCommand::new("/bin/sh").with_prefix_args(["-c", script, "ffmpeg"]);
            Transcoder::new(tool, Some("128k".to_string()))
        }

        fn input(parts: &[&'static [u8]]) -> StreamHandle {
            let items: Vec<std::io::Result<Bytes>> =
                parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
            StreamHandle::new("test", futures::stream::iter(items))
        }

        #[tokio::test]
        async fn test_to_artifact_writes_output() {
            let temp = TempDir::new().unwrap();
            let store = ArtifactStore::open(temp.path()).await.unwrap();
            let mut record = store.allocate("audio", "mp3", "req");

            let len = fake(FAKE_FFMPEG)
                .to_artifact(input(&[b"ID3", b"frames"]), TargetFormat::Mp3, &mut record)
                .await
                .unwrap();

            assert_eq!(len, 9);
            assert_eq!(record.state(), ArtifactState::Complete);
            assert_eq!(std::fs::read(record.path()).unwrap(), b"ID3frames");
        }

        #[tokio::test]
        async fn test_to_artifact_reports_failure() {
            let temp = TempDir::new().unwrap();
            let store = ArtifactStore::open(temp.path()).await.unwrap();
            let mut record = store.allocate("audio", "mp3", "req");

            let err = fake("cat > /dev/null; echo 'Invalid data found when processing input' >&2; exit 1")
                .to_artifact(input(&[b"not media"]), TargetFormat::Mp3, &mut record)
                .await
                .unwrap_err();

            assert!(matches!(err, Error::TranscodeFailure(msg) if msg.contains("Invalid data")));
            assert_ne!(record.state(), ArtifactState::Complete);
        }

        #[tokio::test]
        async fn test_to_artifact_fails_on_input_error() {
            let temp = TempDir::new().unwrap();
            let store = ArtifactStore::open(temp.path()).await.unwrap();
            let mut record = store.allocate("audio", "mp3", "req");
            let broken = StreamHandle::new(
                "test",
                futures::stream::iter(vec![
                    Ok(Bytes::from_static(b"abc")),
                    Err(std::io::Error::other("connection reset")),
                ]),
            );

            let err = fake(FAKE_FFMPEG)
                .to_artifact(broken, TargetFormat::Mp3, &mut record)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::TranscodeFailure(msg) if msg.contains("connection reset")));
        }

        #[tokio::test]
        async fn test_to_stream_passes_bytes_through() {
            let out = fake(FAKE_FFMPEG)
                .to_stream(input(&[b"one", b"two"]), TargetFormat::Mp3)
                .unwrap();
            assert_eq!(out.content_type(), Some("audio/mpeg"));
            let body: Vec<Bytes> = out.try_collect().await.unwrap();
            assert_eq!(body.concat(), b"onetwo");
        }

        #[tokio::test]
        async fn test_to_stream_ends_with_error_on_failure() {
            let mut out = fake("cat > /dev/null; exit 1")
                .to_stream(input(&[b"x"]), TargetFormat::Mp3)
                .unwrap();
            let err = out.next().await.unwrap().unwrap_err();
            let err = Error::from_stream_io(err, Error::TranscodeFailure);
            assert!(matches!(err, Error::TranscodeFailure(_)));
            assert!(out.next().await.is_none());
        }
    }
}
