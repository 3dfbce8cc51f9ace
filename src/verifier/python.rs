//! Bounded interpreter subprocess execution.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::VerifierError;

const OUTPUT_LIMIT: usize = 10_000;

/// Captured result of one bounded interpreter run.
#[derive(Debug)]
pub(crate) struct RunOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Runs the interpreter under a wall-clock deadline.
///
/// Streams are piped and drained concurrently with the wait, so output
/// written before a deadline kill is preserved. The child is killed and
/// reaped when the deadline expires.
pub(crate) async fn run_bounded(
    python_bin: &str,
    args: &[&str],
    workdir: &Path,
    limit: Duration,
) -> Result<RunOutput, VerifierError> {
    let mut child = Command::new(python_bin)
        .args(args)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| VerifierError::Spawn {
            bin: python_bin.to_string(),
            source,
        })?;

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();

    let joined = async {
        let (out_read, err_read, status) = tokio::join!(
            read_stream(&mut stdout_pipe, &mut stdout_buf),
            read_stream(&mut stderr_pipe, &mut stderr_buf),
            child.wait(),
        );
        out_read?;
        err_read?;
        status
    };

    match tokio::time::timeout(limit, joined).await {
        Ok(Ok(status)) => Ok(RunOutput {
            exit_code: status.code(),
            stdout: capture(&stdout_buf),
            stderr: capture(&stderr_buf),
            timed_out: false,
        }),
        Ok(Err(e)) => Err(VerifierError::Io(e)),
        Err(_) => {
            let _ = child.kill().await;
            Ok(RunOutput {
                exit_code: None,
                stdout: capture(&stdout_buf),
                stderr: capture(&stderr_buf),
                timed_out: true,
            })
        }
    }
}

async fn read_stream<R>(stream: &mut Option<R>, buf: &mut Vec<u8>) -> std::io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    if let Some(stream) = stream {
        stream.read_to_end(buf).await?;
    }
    Ok(())
}

fn capture(buf: &[u8]) -> String {
    truncate(&String::from_utf8_lossy(buf), OUTPUT_LIMIT)
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}... [truncated]", &s[..end])
    }
}
