use std::fmt;
use std::process::Stdio;

use tokio::process::ChildStdout;
use tracing::{debug, warn};

use crate::config::ToolCommand;
use crate::process::{FeedError, FeedTask, ToolProcess};
use crate::stream::StreamHandle;
use crate::{Error, Result};

/// Lifecycle of a transcode job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Spawned,
    Running,
    FinishedOk,
    FinishedError,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Spawned => "spawned",
            Self::Running => "running",
            Self::FinishedOk => "finished-ok",
            Self::FinishedError => "finished-error",
        };
        f.write_str(s)
    }
}

/// One external process fed from one input stream.
///
/// The job exclusively owns its input (through the feeder) and its process.
/// Dropping an unfinished job kills the process and aborts the feeder, which
/// drops the input.
pub struct TranscodeJob {
    label: String,
    state: JobState,
    process: Option<ToolProcess>,
    feed: Option<FeedTask>,
}

impl TranscodeJob {
    /// Spawn `tool` and start feeding `input` into its stdin.
    ///
    /// When `capture_stdout` is set the process's stdout is returned for the
    /// caller to consume; otherwise it is discarded.
    pub fn spawn(
        tool: &ToolCommand,
        args: &[String],
        input: StreamHandle,
        capture_stdout: bool,
    ) -> Result<(Self, Option<ChildStdout>)> {
        let stdout = if capture_stdout {
            Stdio::piped()
        } else {
            Stdio::null()
        };
        let mut process = ToolProcess::spawn(tool, args, Stdio::piped(), stdout)
            .map_err(|e| Error::transcode(format!("failed to spawn {}: {}", tool.name(), e)))?;

        let mut job = Self {
            label: process.label().to_string(),
            state: JobState::Spawned,
            process: None,
            feed: None,
        };
        debug!(tool = %job.label, pid = ?process.id(), input = input.producer(), "Transcode job spawned");

        let stdin = process
            .take_stdin()
            .map_err(|e| Error::transcode(e.to_string()))?;
        let stdout = if capture_stdout {
            Some(
                process
                    .take_stdout()
                    .map_err(|e| Error::transcode(e.to_string()))?,
            )
        } else {
            None
        };

        job.feed = Some(FeedTask::spawn(input, stdin));
        job.process = Some(process);
        job.state = JobState::Running;
        Ok((job, stdout))
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Wait for the process to exit and settle the job.
    ///
    /// A non-zero exit, or an input stream that failed part way, is a
    /// [`Error::TranscodeFailure`]. The tool closing its stdin early is fine as
    /// long as it exits cleanly.
    pub async fn finish(mut self) -> Result<()> {
        let result = self.settle().await;
        self.state = if result.is_ok() {
            JobState::FinishedOk
        } else {
            JobState::FinishedError
        };
        debug!(tool = %self.label, state = %self.state, "Transcode job finished");
        result
    }

    async fn settle(&mut self) -> Result<()> {
        let Some(process) = self.process.take() else {
            return Err(Error::transcode(format!("{} already finished", self.label)));
        };
        let exit = process
            .wait()
            .await
            .map_err(|e| Error::transcode(format!("waiting for {} failed: {}", self.label, e)))?;

        if !exit.success() {
            // Whatever the feeder was doing no longer matters.
            self.feed.take();
            return Err(Error::transcode(exit.describe(&self.label)));
        }

        match self.feed.take() {
            Some(feed) => match feed.join().await {
                Ok(_) => Ok(()),
                Err(e) if e.is_broken_pipe() => Ok(()),
                Err(FeedError::Input(e)) => {
                    Err(Error::transcode(format!("input stream failed: {}", e)))
                }
                Err(e) => Err(Error::transcode(e.to_string())),
            },
            None => Ok(()),
        }
    }
}

impl fmt::Debug for TranscodeJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscodeJob")
            .field("label", &self.label)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for TranscodeJob {
    fn drop(&mut self) {
        if matches!(self.state, JobState::Spawned | JobState::Running) {
            warn!(tool = %self.label, "Transcode job dropped before completion; killing process");
        }
    }
}
