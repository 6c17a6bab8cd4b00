// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no capture logic.
// The capture pipeline (claim, run, verify, report) lives in domains/captures and uses these.
//
// Naming convention: Base* for trait names (e.g., BaseCaptureStore, BasePortProbe)

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domains::captures::models::{Capture, CaptureStatus};

// =============================================================================
// Job Store Trait (Infrastructure - durable capture records)
// =============================================================================

#[async_trait]
pub trait BaseCaptureStore: Send + Sync {
    /// Persist a new capture record
    async fn insert(&self, capture: &Capture) -> Result<()>;

    /// Read a single capture record
    async fn find_by_id(&self, id: Uuid) -> Result<Capture>;

    /// Oldest `pending` capture by creation time, if any
    async fn find_oldest_pending(&self) -> Result<Option<Capture>>;

    /// Atomically move a capture from `pending` to `started`.
    ///
    /// Returns false when the capture was no longer pending (another worker claimed it).
    async fn try_claim(&self, id: Uuid) -> Result<bool>;

    /// Write the full record back. Rejects status regressions.
    async fn save(&self, capture: &Capture) -> Result<()>;

    /// Write only a terminal status and its end time, for when the full record cannot be saved.
    async fn mark_terminal(
        &self,
        id: Uuid,
        status: CaptureStatus,
        ended: DateTime<Utc>,
    ) -> Result<()>;
}

// =============================================================================
// Port Probe Trait (Infrastructure - proxy port availability)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStatus {
    Free,
    Busy,
}

#[async_trait]
pub trait BasePortProbe: Send + Sync {
    /// Classify a local TCP port as usable by the engine's proxy or not
    async fn probe(&self, port: u16) -> PortStatus;
}

// =============================================================================
// Webhook Trait (Infrastructure - outbound callbacks)
// =============================================================================

#[async_trait]
pub trait BaseWebhookNotifier: Send + Sync {
    /// Deliver a JSON payload to a callback URL, once
    async fn notify(&self, callback_url: &str, payload: &serde_json::Value) -> Result<()>;
}
