//! Child-process runner for the model backend: bounded wall time, bounded
//! captured output, stdin fed from a buffer.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// What a finished (or killed) child left behind.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Bytes of stdout read but not kept because of the output limit.
    pub stdout_dropped: usize,
    pub timed_out: bool,
}

impl ProcessOutput {
    /// Last `max_bytes` of stderr as lossy UTF-8, for error messages.
    pub fn stderr_tail(&self, max_bytes: usize) -> String {
        let start = self.stderr.len().saturating_sub(max_bytes);
        String::from_utf8_lossy(&self.stderr[start..]).trim().to_string()
    }
}

/// Spawn `cmd`, write `input` to its stdin, and wait at most `timeout`.
///
/// stdin, stdout and stderr are serviced on their own threads so a chatty
/// child cannot deadlock against a full pipe. At most `output_limit_bytes`
/// of each stream are kept; the rest is drained and counted. A child still
/// running at the deadline is killed and reported with `timed_out = true`.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), input_bytes = input.len()))]
pub fn run_with_input(
    mut cmd: Command,
    input: &[u8],
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<ProcessOutput> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn model backend")?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let payload = input.to_vec();
    // Dropping `stdin` at the end of the closure closes the pipe.
    let stdin_handle = thread::spawn(move || stdin.write_all(&payload).context("write stdin"));
    let stdout_handle = thread::spawn(move || read_bounded(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_bounded(stderr, output_limit_bytes));

    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for backend")? {
        Some(status) => (status, false),
        None => {
            warn!(timeout_secs = timeout.as_secs(), "backend timed out, killing");
            child.kill().context("kill backend")?;
            (child.wait().context("reap backend")?, true)
        }
    };

    // A child may exit without reading all of stdin; its status decides.
    if let Err(err) = join(stdin_handle) {
        debug!(err = %err, "backend did not consume all input");
    }
    let (stdout, stdout_dropped) = join(stdout_handle).context("collect stdout")?;
    let (stderr, _) = join(stderr_handle).context("collect stderr")?;

    if stdout_dropped > 0 {
        warn!(stdout_dropped, "backend output truncated");
    }
    debug!(exit_code = ?status.code(), timed_out, "backend finished");

    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
        stdout_dropped,
        timed_out,
    })
}

fn join<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    handle
        .join()
        .map_err(|_| anyhow!("pipe thread panicked"))?
}

fn read_bounded<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read pipe")?;
        if n == 0 {
            break;
        }
        let keep = n.min(limit.saturating_sub(kept.len()));
        kept.extend_from_slice(&chunk[..keep]);
        dropped += n - keep;
    }
    Ok((kept, dropped))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn echoes_stdin_back() {
        let out = run_with_input(sh("cat"), b"hello", Duration::from_secs(10), 1024)
            .expect("run");
        assert!(out.status.success());
        assert!(!out.timed_out);
        assert_eq!(out.stdout, b"hello");
    }

    #[test]
    fn output_beyond_limit_is_counted_not_kept() {
        let out = run_with_input(
            sh("printf 'abcdefghij'"),
            b"",
            Duration::from_secs(10),
            4,
        )
        .expect("run");
        assert_eq!(out.stdout, b"abcd");
        assert_eq!(out.stdout_dropped, 6);
    }

    #[test]
    fn slow_child_is_killed() {
        let out = run_with_input(sh("exec sleep 5"), b"", Duration::from_millis(200), 1024)
            .expect("run");
        assert!(out.timed_out);
        assert!(!out.status.success());
    }

    #[test]
    fn stderr_tail_keeps_the_end() {
        let out = run_with_input(
            sh("echo 'early noise' >&2; echo 'final reason' >&2; exit 3"),
            b"",
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        assert_eq!(out.status.code(), Some(3));
        assert_eq!(out.stderr_tail(13), "final reason");
    }
}
