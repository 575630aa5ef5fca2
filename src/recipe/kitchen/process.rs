// src/recipe/kitchen/process.rs

//! Child process execution with a timeout and a cancellation token
//!
//! Output pipes are drained on background threads so a chatty child cannot
//! block on a full pipe while we wait for it.

use std::io::{self, Read};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;
use wait_timeout::ChildExt;

/// Shared flag set when the run should stop
pub type CancelToken = Arc<AtomicBool>;

/// Create a token in the not-cancelled state
pub fn cancel_token() -> CancelToken {
    Arc::new(AtomicBool::new(false))
}

/// Granularity of cancellation checks while a child runs
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Result of running a child to completion (or until it was killed)
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub outcome: Outcome,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Exit code, when the child exited on its own
    pub fn exit_code(&self) -> Option<i32> {
        match self.outcome {
            Outcome::Exited(status) => status.code(),
            _ => None,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self.outcome, Outcome::Exited(status) if status.success())
    }

    /// Stdout followed by stderr
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len());
        out.push_str(&self.stdout);
        out.push_str(&self.stderr);
        out
    }
}

/// Run `cmd` with stdin closed and output captured
///
/// The child runs in its own process group. The whole group is killed when
/// `timeout` expires or `cancel` is set, so helpers the child started do
/// not outlive it or hold its pipes open. Spawn failures are returned as
/// `Err` so callers can tell them apart from a child that ran and failed.
pub fn run_with_timeout(
    cmd: &mut Command,
    timeout: Duration,
    cancel: &AtomicBool,
) -> io::Result<ProcessOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);
    let mut child = cmd.spawn()?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let outcome = match wait(&mut child, timeout, cancel) {
        Ok(outcome) => outcome,
        Err(e) => {
            terminate(&mut child);
            let _ = stdout.join();
            let _ = stderr.join();
            return Err(e);
        }
    };

    // Stragglers left in the group would keep the pipes open
    kill_group(&child);

    Ok(ProcessOutput {
        outcome,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

fn wait(child: &mut Child, timeout: Duration, cancel: &AtomicBool) -> io::Result<Outcome> {
    let started = Instant::now();
    loop {
        if cancel.load(Ordering::SeqCst) {
            debug!("Cancellation requested, killing child {}", child.id());
            terminate(child);
            return Ok(Outcome::Cancelled);
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            debug!(
                "Child {} exceeded {} seconds, killing",
                child.id(),
                timeout.as_secs()
            );
            terminate(child);
            return Ok(Outcome::TimedOut);
        }

        if let Some(status) = child.wait_timeout(POLL_INTERVAL.min(timeout - elapsed))? {
            if interrupted(status) || (!status.success() && cancel.load(Ordering::SeqCst)) {
                return Ok(Outcome::Cancelled);
            }
            return Ok(Outcome::Exited(status));
        }
    }
}

fn terminate(child: &mut Child) {
    kill_group(child);
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    // ESRCH just means the group is already gone
    let _ = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

/// Whether the child died of SIGINT
#[cfg(unix)]
fn interrupted(status: ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;

    status.signal() == Some(nix::sys::signal::Signal::SIGINT as i32)
}

#[cfg(not(unix))]
fn interrupted(_status: ExitStatus) -> bool {
    false
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}
