use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::config::ToolCommand;
use crate::process::ToolProcess;
use crate::{Error, Result};

/// Run a tool to completion and return its stdout.
///
/// A non-zero exit or exceeding `timeout` is a [`Error::TranscodeFailure`].
/// On timeout the process is killed.
pub async fn run_tool(tool: &ToolCommand, args: &[String], timeout: Duration) -> Result<Vec<u8>> {
    let start = std::time::Instant::now();
    let mut process = ToolProcess::spawn(tool, args, Stdio::null(), Stdio::piped())
        .map_err(|e| Error::transcode(format!("failed to spawn {}: {}", tool.name(), e)))?;
    let mut stdout = process
        .take_stdout()
        .map_err(|e| Error::transcode(e.to_string()))?;
    let label = process.label().to_string();

    // The process lives inside the future, so a timeout drops and kills it.
    let run = async move {
        let mut out = Vec::new();
        stdout.read_to_end(&mut out).await?;
        let exit = process.wait().await?;
        Ok::<_, std::io::Error>((out, exit))
    };

    match tokio::time::timeout(timeout, run).await {
        Err(_) => {
            warn!(tool = %label, timeout_secs = timeout.as_secs(), "Tool timed out; killed");
            Err(Error::transcode(format!(
                "{} timed out after {}s",
                label,
                timeout.as_secs()
            )))
        }
        Ok(Err(e)) => Err(Error::transcode(format!("{} failed: {}", label, e))),
        Ok(Ok((_, exit))) if !exit.success() => Err(Error::transcode(exit.describe(&label))),
        Ok(Ok((out, _))) => {
            debug!(
                tool = %label,
                stdout_bytes = out.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Tool completed"
            );
            Ok(out)
        }
    }
}
