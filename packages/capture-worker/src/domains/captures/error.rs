//! Typed errors for a single capture run.
//!
//! Every variant ends the capture as `failed`; none of them escape the cycle.
//! Port conflicts and lost claims are cycle outcomes, not errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::models::CaptureStatus;
use crate::kernel::TerminationStage;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// Engine outlived soft timeout + fuse and had to be stopped
    #[error("engine still running after {deadline:?}, {stage}")]
    EngineTimeout {
        deadline: Duration,
        stage: TerminationStage,
    },

    /// Engine exited unsuccessfully
    #[error("exit code {}", describe_exit(.exit_code))]
    NonZeroExit { exit_code: Option<i32> },

    /// An artifact the engine declared is not on disk
    #[error("{} not found", .path.display())]
    MissingArtifact { path: PathBuf },

    /// Manifest could not be read or does not have the expected shape
    #[error("malformed manifest {}: {reason}", .path.display())]
    MalformedManifest { path: PathBuf, reason: String },

    /// Worker shutdown was requested while the engine was running
    #[error("interrupted by shutdown request")]
    Interrupted,

    /// The capture pipeline panicked
    #[error("capture pipeline panicked: {0}")]
    Panicked(String),

    /// Working directory tree could not be prepared
    #[error("could not prepare {}: {source}", .path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Engine process could not be started or supervised
    #[error("could not run engine `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Worker configuration cannot produce a valid invocation
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Attempt to move a capture's status backwards
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: CaptureStatus,
        to: CaptureStatus,
    },

    /// Job store failure
    #[error("job store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

impl CaptureError {
    /// Short reason logged alongside the `failed` transition.
    pub fn failure_reason(&self) -> String {
        match self {
            CaptureError::EngineTimeout { .. } => "timeout violation".to_string(),
            CaptureError::Interrupted => "operation aborted".to_string(),
            CaptureError::NonZeroExit { .. } | CaptureError::MissingArtifact { .. } => {
                self.to_string()
            }
            _ => "other, see logs".to_string(),
        }
    }

    /// Failures the engine itself is responsible for, as opposed to worker faults.
    pub fn is_capture_failure(&self) -> bool {
        matches!(
            self,
            CaptureError::EngineTimeout { .. }
                | CaptureError::NonZeroExit { .. }
                | CaptureError::MissingArtifact { .. }
                | CaptureError::MalformedManifest { .. }
        )
    }
}
