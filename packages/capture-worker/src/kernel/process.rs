//! Engine subprocess supervision.
//!
//! The engine runs in its own process group so that a stop request reaches
//! every helper it spawned. Stopping is two-staged: SIGTERM to the group, a
//! grace period, then SIGKILL.

use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on waiting for the output pipes after the process is gone.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How far termination had to go before the process was gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStage {
    /// Process finished on its own before any signal was sent
    AlreadyExited,
    /// Process exited within the grace period after SIGTERM
    Terminated,
    /// Process had to be force-killed
    Killed,
}

impl fmt::Display for TerminationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationStage::AlreadyExited => f.write_str("exited before termination"),
            TerminationStage::Terminated => f.write_str("terminated gracefully"),
            TerminationStage::Killed => f.write_str("killed after grace period"),
        }
    }
}

/// Why supervision stopped waiting on the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited,
    TimedOut(TerminationStage),
    Interrupted(TerminationStage),
}

#[derive(Debug, Clone)]
pub struct SupervisedOutput {
    /// `None` when the process died from a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub termination: Termination,
}

#[derive(Debug, Clone, Copy)]
pub struct TerminationPolicy {
    pub grace_period: Duration,
}

impl TerminationPolicy {
    pub fn new(grace_period: Duration) -> Self {
        Self { grace_period }
    }

    /// Stop a running child, escalating to SIGKILL if the grace period runs out.
    ///
    /// Always reaps the child before returning.
    pub async fn terminate(&self, child: &mut Child) -> io::Result<TerminationStage> {
        if child.try_wait()?.is_some() {
            return Ok(TerminationStage::AlreadyExited);
        }
        let Some(pid) = child.id() else {
            return Ok(TerminationStage::AlreadyExited);
        };

        debug!(pid, grace = ?self.grace_period, "sending SIGTERM to engine process group");
        if !send_terminate(pid, child) {
            return Ok(TerminationStage::AlreadyExited);
        }

        match tokio::time::timeout(self.grace_period, child.wait()).await {
            Ok(status) => {
                status?;
                Ok(TerminationStage::Terminated)
            }
            Err(_) => {
                warn!(pid, "engine ignored SIGTERM, sending SIGKILL");
                send_kill(pid);
                match child.kill().await {
                    Ok(()) => {}
                    // Already reaped
                    Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
                    Err(e) => return Err(e),
                }
                child.wait().await?;
                Ok(TerminationStage::Killed)
            }
        }
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), signal) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(e) => {
            warn!(pid, ?signal, error = %e, "failed to signal engine process group");
            false
        }
    }
}

#[cfg(unix)]
fn send_terminate(pid: u32, _child: &mut Child) -> bool {
    signal_group(pid, nix::sys::signal::Signal::SIGTERM)
}

#[cfg(unix)]
fn send_kill(pid: u32) {
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
}

#[cfg(not(unix))]
fn send_terminate(_pid: u32, child: &mut Child) -> bool {
    // No graceful stop available; the grace wait then observes the kill.
    child.start_kill().is_ok()
}

#[cfg(not(unix))]
fn send_kill(_pid: u32) {}

fn drain<R>(reader: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            if let Err(e) = reader.read_to_end(&mut buf).await {
                debug!(error = %e, "engine output stream closed with error");
            }
        }
        buf
    })
}

async fn collect(mut handle: JoinHandle<Vec<u8>>, stream: &'static str) -> String {
    match tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            warn!(stream, error = %e, "engine output reader failed");
            String::new()
        }
        Err(_) => {
            warn!(stream, "engine output still open after exit, giving up on it");
            handle.abort();
            String::new()
        }
    }
}

enum Wake {
    Exited(io::Result<ExitStatus>),
    Deadline,
    Shutdown,
}

/// Run a command to completion, capturing its output.
///
/// The process is stopped through `policy` if it is still running at `deadline`
/// or when `shutdown` is cancelled.
pub async fn run_supervised(
    mut command: Command,
    deadline: Duration,
    policy: &TerminationPolicy,
    shutdown: &CancellationToken,
) -> io::Result<SupervisedOutput> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let wake = tokio::select! {
        status = child.wait() => Wake::Exited(status),
        _ = tokio::time::sleep(deadline) => Wake::Deadline,
        _ = shutdown.cancelled() => Wake::Shutdown,
    };

    let (status, termination) = match wake {
        Wake::Exited(status) => (status?, Termination::Exited),
        Wake::Deadline => {
            info!(?deadline, "engine exceeded its deadline, stopping it");
            let stage = policy.terminate(&mut child).await?;
            (child.wait().await?, Termination::TimedOut(stage))
        }
        Wake::Shutdown => {
            info!("shutdown requested, stopping engine");
            let stage = policy.terminate(&mut child).await?;
            (child.wait().await?, Termination::Interrupted(stage))
        }
    };

    let stdout = collect(stdout, "stdout").await;
    let stderr = collect(stderr, "stderr").await;

    Ok(SupervisedOutput {
        exit_code: status.code(),
        stdout,
        stderr,
        termination,
    })
}
