//! Kernel module - worker infrastructure and dependencies.

pub mod deps;
pub mod memory_store;
pub mod port_probe;
pub mod postgres_store;
pub mod process;
pub mod test_dependencies;
pub mod traits;
pub mod webhook;

pub use deps::WorkerDeps;
pub use memory_store::MemoryCaptureStore;
pub use port_probe::HttpPortProbe;
pub use postgres_store::PostgresCaptureStore;
pub use process::{run_supervised, SupervisedOutput, Termination, TerminationPolicy, TerminationStage};
pub use test_dependencies::{MockPortProbe, MockWebhookNotifier, WebhookCall};
pub use traits::*;
pub use webhook::HttpWebhookNotifier;
