//! Capture worker: the supervisor loop around single capture cycles.
//!
//! The `CaptureWorker` is a long-running service that:
//! - Stops issuing cycles once the deployment sentinel exists or shutdown is requested
//! - Picks the oldest pending capture and probes its proxy port
//! - Claims the capture, runs the engine and verifies the artifacts
//! - Records the terminal status and calls back the caller's webhook
//!
//! Every cycle outcome maps to the next cycle through [`CycleOutcome::next_cycle`].
//! Nothing that goes wrong inside a cycle stops the loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use anyhow::Result;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::activities::{
    claim_capture, finalize, notify_callback, run_engine, stamp_started, verify_artifacts,
    CaptureWorkspace, ClaimOutcome, EngineInvocation,
};
use super::error::CaptureError;
use super::models::{Capture, CaptureStatus};
use crate::config::CaptureConfig;
use crate::kernel::{PortStatus, Termination, WorkerDeps};

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Deployment sentinel present or shutdown requested; nothing was claimed
    Stopped,
    /// Nothing pending
    NoWork,
    /// Another worker claimed the candidate first
    ClaimLost { id_capture: Uuid },
    /// Proxy port in use; no capture was touched
    PortConflict { port: u16 },
    /// A capture was claimed and brought to a terminal status
    Completed {
        id_capture: Uuid,
        status: CaptureStatus,
    },
    /// The cycle failed before a capture reached a terminal status
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextCycle {
    Stop,
    Continue { port: u16, delay: Duration },
}

impl CycleOutcome {
    pub fn next_cycle(&self, port: u16, config: &CaptureConfig) -> NextCycle {
        match self {
            CycleOutcome::Stopped => NextCycle::Stop,
            CycleOutcome::PortConflict { port } => NextCycle::Continue {
                port: port.checked_add(1).unwrap_or(config.proxy_port),
                delay: Duration::ZERO,
            },
            CycleOutcome::NoWork | CycleOutcome::Aborted => NextCycle::Continue {
                port,
                delay: config.poll_interval,
            },
            CycleOutcome::ClaimLost { .. } | CycleOutcome::Completed { .. } => {
                NextCycle::Continue {
                    port,
                    delay: Duration::ZERO,
                }
            }
        }
    }
}

pub struct CaptureWorker {
    config: CaptureConfig,
    deps: WorkerDeps,
}

impl CaptureWorker {
    pub fn new(config: CaptureConfig, deps: WorkerDeps) -> Self {
        Self { config, deps }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Run cycles until the sentinel appears or `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut port = self.config.proxy_port;
        info!(
            port,
            storage = %self.config.temporary_storage_path.display(),
            sentinel = %self.config.deployment_sentinel_path.display(),
            "capture worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let outcome = self.run_cycle(port, &shutdown).await;

            match outcome.next_cycle(port, &self.config) {
                NextCycle::Stop => break,
                NextCycle::Continue { port: next, delay } => {
                    if next != port {
                        info!(from = port, to = next, "moving to next proxy port");
                    }
                    port = next;

                    if !delay.is_zero() {
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }

        info!(port, "capture worker stopped");
        Ok(())
    }

    /// Run exactly one cycle on the configured starting port.
    pub async fn run_once(&self, shutdown: &CancellationToken) -> CycleOutcome {
        self.run_cycle(self.config.proxy_port, shutdown).await
    }

    /// One full cycle: sentinel, candidate, port probe, claim, capture, report.
    ///
    /// A panic anywhere in the cycle aborts it instead of the loop.
    pub async fn run_cycle(&self, port: u16, shutdown: &CancellationToken) -> CycleOutcome {
        let cycle = self
            .try_cycle(port, shutdown)
            .instrument(info_span!("cycle", port));

        match AssertUnwindSafe(cycle).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                error!(port, panic = %panic_message(panic.as_ref()), "capture cycle panicked");
                CycleOutcome::Aborted
            }
        }
    }

    async fn try_cycle(&self, port: u16, shutdown: &CancellationToken) -> CycleOutcome {
        if self.sentinel_present().await {
            info!("deployment sentinel present, not starting new captures");
            return CycleOutcome::Stopped;
        }

        let candidate = match self.deps.store.find_oldest_pending().await {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                debug!("no pending captures");
                return CycleOutcome::NoWork;
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "failed to look up pending captures");
                return CycleOutcome::Aborted;
            }
        };

        if self.deps.port_probe.probe(port).await == PortStatus::Busy {
            warn!(port, "proxy port already in use, retrying on the next one");
            return CycleOutcome::PortConflict { port };
        }

        if shutdown.is_cancelled() {
            info!("shutdown requested, leaving pending captures alone");
            return CycleOutcome::Stopped;
        }

        let capture = match claim_capture(self.deps.store.as_ref(), &candidate).await {
            Ok(ClaimOutcome::Claimed(capture)) => capture,
            Ok(ClaimOutcome::Lost) => {
                return CycleOutcome::ClaimLost {
                    id_capture: candidate.id_capture,
                }
            }
            Err(e) => {
                error!(capture_id = %candidate.id_capture, error = %e, "failed to claim capture");
                return CycleOutcome::Aborted;
            }
        };

        let id_capture = capture.id_capture;
        let status = self
            .process_claimed(capture, port, shutdown)
            .instrument(info_span!("capture", capture_id = %id_capture))
            .await;

        CycleOutcome::Completed { id_capture, status }
    }

    async fn sentinel_present(&self) -> bool {
        match tokio::fs::try_exists(&self.config.deployment_sentinel_path).await {
            Ok(present) => present,
            Err(e) => {
                warn!(
                    path = %self.config.deployment_sentinel_path.display(),
                    error = %e,
                    "could not check deployment sentinel"
                );
                false
            }
        }
    }

    /// Drive a claimed capture to a terminal status. Never returns early.
    async fn process_claimed(
        &self,
        mut capture: Capture,
        port: u16,
        shutdown: &CancellationToken,
    ) -> CaptureStatus {
        let outcome = AssertUnwindSafe(self.execute(&mut capture, port, shutdown))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(CaptureError::Panicked(panic_message(panic.as_ref()))));

        let status = match &outcome {
            Ok(()) => {
                info!("capture succeeded");
                CaptureStatus::Success
            }
            Err(e) if e.is_capture_failure() => {
                warn!(reason = %e.failure_reason(), error = %e, "capture failed");
                CaptureStatus::Failed
            }
            Err(e) => {
                error!(reason = %e.failure_reason(), error = %e, "capture failed");
                CaptureStatus::Failed
            }
        };

        if let Err(e) = finalize(self.deps.store.as_ref(), &mut capture, status).await {
            error!(%status, error = %e, "failed to record terminal status");
        }

        notify_callback(self.deps.webhook.as_ref(), &capture).await;

        capture.status
    }

    async fn execute(
        &self,
        capture: &mut Capture,
        port: u16,
        shutdown: &CancellationToken,
    ) -> Result<(), CaptureError> {
        stamp_started(self.deps.store.as_ref(), capture).await?;

        let workspace = CaptureWorkspace::for_capture(
            &self.config.temporary_storage_path,
            capture.id_capture,
            self.config.archive_format(),
        );
        workspace.create().await?;

        let invocation = EngineInvocation::new(&self.config, &capture.url, &workspace, port)?;
        let deadline = self
            .config
            .engine_deadline()
            .map_err(|e| CaptureError::Configuration(format!("{e:#}")))?;

        info!(url = %capture.url, root = %workspace.root.display(), "running capture");
        let output = run_engine(
            &invocation,
            deadline,
            &self.config.termination_policy(),
            shutdown,
        )
        .await?;

        debug!(exit_code = ?output.exit_code, termination = ?output.termination, "engine finished");
        capture.record_run(output.exit_code, output.stdout, output.stderr);
        if let Err(e) = self.deps.store.save(capture).await {
            warn!(error = %format!("{e:#}"), "failed to persist engine output");
        }

        match output.termination {
            Termination::Exited => {}
            Termination::TimedOut(stage) => {
                return Err(CaptureError::EngineTimeout { deadline, stage })
            }
            Termination::Interrupted(_) => return Err(CaptureError::Interrupted),
        }

        if output.exit_code != Some(0) {
            return Err(CaptureError::NonZeroExit {
                exit_code: output.exit_code,
            });
        }

        let report = verify_artifacts(&workspace).await;
        capture.record_summary(report.summary.clone());
        report.into_result(&workspace.summary_path)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
