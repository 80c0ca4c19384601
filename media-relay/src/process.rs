//! Spawning and supervising external tools.

use std::io;
use std::process::{ExitStatus, Stdio};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::ToolCommand;
use crate::stream::StreamHandle;

/// A spawned tool with its stderr drained in the background.
#[derive(Debug)]
pub struct ToolProcess {
    label: String,
    child: Child,
    stderr: Option<JoinHandle<String>>,
}

/// Final status of a tool and the tail of what it printed on stderr.
#[derive(Debug)]
pub struct ToolExit {
    pub status: ExitStatus,
    pub stderr_tail: String,
}

impl ToolExit {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// One-line description of a failed run.
    pub fn describe(&self, label: &str) -> String {
        if self.stderr_tail.is_empty() {
            format!("{} exited with {}", label, self.status)
        } else {
            format!("{} exited with {}: {}", label, self.status, self.stderr_tail)
        }
    }
}

impl ToolProcess {
    /// Spawn `tool` with `args`. Stderr is always captured.
    pub fn spawn(tool: &ToolCommand, args: &[String], stdin: Stdio, stdout: Stdio) -> io::Result<Self> {
        let mut cmd = tool.command();
        cmd.args(args).stdin(stdin).stdout(stdout).stderr(Stdio::piped());
        debug!(tool = tool.name(), ?args, "Spawning tool");

        let mut child = cmd.spawn()?;
        let stderr = child.stderr.take().map(|stderr| {
            process_utils::collect_stderr_tail(stderr, process_utils::DEFAULT_STDERR_TAIL_LINES)
        });

        Ok(Self {
            label: tool.name().to_string(),
            child,
            stderr,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn take_stdin(&mut self) -> io::Result<ChildStdin> {
        self.child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other(format!("{} stdin not captured", self.label)))
    }

    pub fn take_stdout(&mut self) -> io::Result<ChildStdout> {
        self.child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other(format!("{} stdout not captured", self.label)))
    }

    /// Wait for the tool to exit and collect its stderr tail.
    pub async fn wait(mut self) -> io::Result<ToolExit> {
        let status = self.child.wait().await?;
        let stderr_tail = self.stderr_tail().await;
        trace!(tool = %self.label, %status, "Tool exited");
        Ok(ToolExit { status, stderr_tail })
    }

    async fn stderr_tail(&mut self) -> String {
        match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        }
    }
}

/// Why feeding a tool's stdin stopped early.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The input stream failed.
    #[error("input failed: {0}")]
    Input(#[source] io::Error),
    /// Writing to the tool failed, usually because it closed stdin.
    #[error("write to tool failed: {0}")]
    Write(#[source] io::Error),
    #[error("feeder task failed: {0}")]
    Join(String),
}

impl FeedError {
    /// The tool stopped reading. Harmless when the tool then exits cleanly.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, Self::Write(e) if e.kind() == io::ErrorKind::BrokenPipe)
    }
}

/// Copies a [`StreamHandle`] into a tool's stdin.
///
/// Writes wait for pipe capacity, so the input is only pulled as fast as the
/// tool consumes it. Dropping the task aborts it, which drops the input.
#[derive(Debug)]
pub struct FeedTask {
    handle: JoinHandle<Result<u64, FeedError>>,
}

impl FeedTask {
    pub fn spawn(mut input: StreamHandle, mut stdin: ChildStdin) -> Self {
        let handle = tokio::spawn(async move {
            let mut written = 0u64;
            while let Some(chunk) = input.next().await {
                let chunk = chunk.map_err(FeedError::Input)?;
                stdin.write_all(&chunk).await.map_err(FeedError::Write)?;
                written += chunk.len() as u64;
            }
            stdin.shutdown().await.map_err(FeedError::Write)?;
            trace!(producer = input.producer(), written, "Input fully fed");
            Ok(written)
        });
        Self { handle }
    }

    /// Wait for the copy to finish. Returns the number of bytes written.
    pub async fn join(mut self) -> Result<u64, FeedError> {
        match (&mut self.handle).await {
            Ok(result) => result,
            Err(e) => Err(FeedError::Join(e.to_string())),
        }
    }
}

impl Drop for FeedTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
