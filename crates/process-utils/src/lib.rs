//! Process helpers shared across the workspace.
//!
//! Every external tool the relay drives (ffmpeg, yt-dlp, soffice, pdftotext)
//! is spawned through [`tokio_command`], so a child process never outlives the
//! handle that owns it.

use std::ffi::OsStr;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Number of stderr lines kept by [`collect_stderr_tail`] by default.
pub const DEFAULT_STDERR_TAIL_LINES: usize = 16;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` that is killed when its `Child` is dropped.
///
/// `LC_ALL=C` keeps tool diagnostics stable for log parsing.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd.kill_on_drop(true).env("LC_ALL", "C");
    cmd
}

/// Keep the last `max_lines` lines read from `reader`.
///
/// Reads until EOF even when a line is not valid UTF-8 or a read fails, so a
/// child writing to the other end never sees its pipe closed early.
#[cfg(feature = "tokio")]
pub async fn read_tail<R>(reader: R, max_lines: usize) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    use std::collections::VecDeque;
    use tokio::io::{AsyncBufReadExt, BufReader};

    let mut tail: VecDeque<String> = VecDeque::with_capacity(max_lines);
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => {
                let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf).trim_end().to_string();
        if line.is_empty() || max_lines == 0 {
            continue;
        }
        if tail.len() == max_lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}

/// Drain a child's stderr in the background, keeping only the last lines.
///
/// The pipe must be drained, otherwise a chatty tool blocks once the pipe
/// buffer fills up.
#[cfg(feature = "tokio")]
pub fn collect_stderr_tail(
    stderr: tokio::process::ChildStderr,
    max_lines: usize,
) -> tokio::task::JoinHandle<String> {
    tokio::spawn(read_tail(stderr, max_lines))
}
