//! Running local child processes with a timeout and bounded output.

use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Stdout followed by stderr as lossy UTF-8, with truncation and timeout notices.
    pub fn combined_text(&self) -> String {
        let mut buf = String::from_utf8_lossy(&self.stdout).into_owned();
        if self.stdout_truncated > 0 {
            buf.push_str(&format!(
                "\n[stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        if !self.stderr.is_empty() {
            if !buf.is_empty() && !buf.ends_with('\n') {
                buf.push('\n');
            }
            buf.push_str(&String::from_utf8_lossy(&self.stderr));
        }
        if self.stderr_truncated > 0 {
            buf.push_str(&format!(
                "\n[stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        if self.timed_out {
            buf.push_str("\n[timed out]\n");
        }
        buf
    }
}

/// How long pipes of a killed child may stay open before their output is dropped.
/// A descendant of the child can hold them past the kill.
const KILLED_PIPE_GRACE: Duration = Duration::from_secs(1);

/// Pipe drained on its own thread; yields the kept bytes and the discarded count.
type Reader = Receiver<Result<(Vec<u8>, usize)>>;

/// Run `cmd` for at most `timeout`, keeping up to `output_limit_bytes` of each stream.
///
/// Both pipes are drained on reader threads while the child runs, so a chatty
/// child never blocks on a full pipe. Bytes past the limit are counted and
/// dropped. A child still running at the deadline is killed; only the direct
/// child is signalled, so output still held open by its descendants is waited
/// on for [`KILLED_PIPE_GRACE`] and then dropped.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .inspect_err(|err| error!(%err, "spawn failed"))
        .context("spawn command")?;

    let stdout = spawn_reader(child.stdout.take(), output_limit_bytes)?;
    let stderr = spawn_reader(child.stderr.take(), output_limit_bytes)?;

    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => (status, false),
        None => {
            warn!(timeout_secs = timeout.as_secs(), "deadline reached; killing child");
            child.kill().context("kill command")?;
            (child.wait().context("reap killed command")?, true)
        }
    };

    let grace = timed_out.then_some(KILLED_PIPE_GRACE);
    let (stdout, stdout_truncated) = collect(&stdout, grace).context("collect stdout")?;
    let (stderr, stderr_truncated) = collect(&stderr, grace).context("collect stderr")?;
    if stdout_truncated + stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output over limit");
    }
    debug!(exit_code = ?status.code(), timed_out, "child exited");

    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>, limit: usize) -> Result<Reader> {
    let pipe = pipe.ok_or_else(|| anyhow!("child pipe missing"))?;
    let (tx, rx) = mpsc::sync_channel(1);
    thread::spawn(move || {
        // The receiver is gone once its grace period ran out.
        let _ = tx.send(drain(pipe, limit));
    });
    Ok(rx)
}

fn drain<R: Read>(mut pipe: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut kept = Vec::new();
    pipe.by_ref()
        .take(limit as u64)
        .read_to_end(&mut kept)
        .context("read output")?;
    let dropped = io::copy(&mut pipe, &mut io::sink()).context("drain output")?;
    Ok((kept, usize::try_from(dropped).unwrap_or(usize::MAX)))
}

fn collect(reader: &Reader, grace: Option<Duration>) -> Result<(Vec<u8>, usize)> {
    let Some(grace) = grace else {
        return reader
            .recv()
            .map_err(|_| anyhow!("output reader panicked"))?;
    };
    match reader.recv_timeout(grace) {
        Ok(drained) => drained,
        Err(RecvTimeoutError::Timeout) => {
            warn!(grace_secs = grace.as_secs(), "pipe still open after kill; dropping output");
            Ok((Vec::new(), 0))
        }
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("output reader panicked")),
    }
}
