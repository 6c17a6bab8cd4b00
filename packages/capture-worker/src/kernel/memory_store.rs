//! In-memory capture store for testing and development.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::traits::BaseCaptureStore;
use crate::domains::captures::models::{Capture, CaptureStatus};

/// In-memory storage for capture records.
///
/// Same semantics as the Postgres store: oldest-first selection, claim as a
/// compare-and-swap, no status regressions, no NUL characters in stored text.
/// Data is lost on restart.
pub struct MemoryCaptureStore {
    captures: RwLock<HashMap<Uuid, Capture>>,
}

impl Default for MemoryCaptureStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCaptureStore {
    pub fn new() -> Self {
        Self {
            captures: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records in the given status.
    pub async fn count_with_status(&self, status: CaptureStatus) -> usize {
        self.captures
            .read()
            .await
            .values()
            .filter(|capture| capture.status == status)
            .count()
    }
}

#[async_trait]
impl BaseCaptureStore for MemoryCaptureStore {
    async fn insert(&self, capture: &Capture) -> Result<()> {
        capture.validate()?;
        reject_nul(capture)?;
        let mut captures = self.captures.write().await;
        if captures.contains_key(&capture.id_capture) {
            bail!("capture {} already exists", capture.id_capture);
        }
        captures.insert(capture.id_capture, capture.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Capture> {
        self.captures
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("capture {} not found", id))
    }

    async fn find_oldest_pending(&self) -> Result<Option<Capture>> {
        Ok(self
            .captures
            .read()
            .await
            .values()
            .filter(|capture| capture.status == CaptureStatus::Pending)
            .min_by_key(|capture| (capture.created_timestamp, capture.id_capture))
            .cloned())
    }

    async fn try_claim(&self, id: Uuid) -> Result<bool> {
        let mut captures = self.captures.write().await;
        match captures.get_mut(&id) {
            Some(capture) if capture.status == CaptureStatus::Pending => {
                capture.status = CaptureStatus::Started;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn save(&self, capture: &Capture) -> Result<()> {
        capture.validate()?;
        reject_nul(capture)?;
        let mut captures = self.captures.write().await;
        let current = captures
            .get_mut(&capture.id_capture)
            .ok_or_else(|| anyhow!("capture {} not found", capture.id_capture))?;

        if !current.status.can_transition_to(capture.status) {
            bail!(
                "capture {}: refusing status change {} -> {}",
                capture.id_capture,
                current.status,
                capture.status
            );
        }

        *current = capture.clone();
        Ok(())
    }

    async fn mark_terminal(
        &self,
        id: Uuid,
        status: CaptureStatus,
        ended: DateTime<Utc>,
    ) -> Result<()> {
        if !status.is_terminal() {
            bail!("capture {}: {} is not a terminal status", id, status);
        }
        let mut captures = self.captures.write().await;
        let current = captures
            .get_mut(&id)
            .ok_or_else(|| anyhow!("capture {} not found", id))?;
        if !current.status.can_transition_to(status) {
            bail!(
                "capture {}: refusing status change {} -> {}",
                id,
                current.status,
                status
            );
        }
        current.status = status;
        current.ended_timestamp = Some(ended);
        Ok(())
    }
}

fn reject_nul(capture: &Capture) -> Result<()> {
    if capture.contains_nul() {
        bail!(
            "capture {}: invalid byte sequence for encoding \"UTF8\": 0x00",
            capture.id_capture
        );
    }
    Ok(())
}
