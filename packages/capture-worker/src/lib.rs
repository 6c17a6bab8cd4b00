// Capture Worker - Core
//
// Turns queued "capture a URL" requests into verified web-archive artifacts by
// supervising an external archiving engine, one capture per cycle.
//
// Infrastructure (job store, port probe, process supervision, webhooks) lives in
// kernel/; capture semantics live in domains/captures/.

pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
