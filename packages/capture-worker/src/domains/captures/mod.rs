//! Capture domain: claim one pending capture, run the archiving engine against it,
//! verify what the engine produced, then record and announce the outcome.
//!
//! ```text
//! CaptureWorker::run (one cycle per iteration)
//!     │
//!     ├─► sentinel present? ─► stop
//!     ├─► oldest pending capture? ─► none: no work
//!     ├─► probe proxy port ─► busy: retry on port + 1
//!     ├─► claim (pending → started, compare-and-swap)
//!     ├─► prepare workspace, run engine under deadline
//!     ├─► verify archive, manifest and attachments
//!     └─► finish (success | failed), call back webhook
//! ```

pub mod activities;
pub mod data;
pub mod error;
pub mod models;
pub mod worker;

pub use data::CaptureData;
pub use error::CaptureError;
pub use models::{Capture, CaptureStatus};
pub use worker::{CaptureWorker, CycleOutcome, NextCycle};
