//! Capture activities - the steps of one capture run, in order.

pub mod claim;
pub mod engine;
pub mod report;
pub mod verify;
pub mod workspace;

pub use claim::{claim_capture, stamp_started, ClaimOutcome};
pub use engine::{run_engine, EngineInvocation};
pub use report::{finalize, notify_callback};
pub use verify::{verify_artifacts, ArtifactReport};
pub use workspace::{ArchiveFormat, CaptureWorkspace};
