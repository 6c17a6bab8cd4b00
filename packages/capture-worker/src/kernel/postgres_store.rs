use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::traits::BaseCaptureStore;
use crate::domains::captures::models::{Capture, CaptureStatus};

/// Capture store backed by the `captures` table.
#[derive(Clone)]
pub struct PostgresCaptureStore {
    pool: PgPool,
}

impl PostgresCaptureStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseCaptureStore for PostgresCaptureStore {
    async fn insert(&self, capture: &Capture) -> Result<()> {
        capture.validate()?;
        capture.insert(&self.pool).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Capture> {
        Capture::find_by_id(id, &self.pool).await
    }

    async fn find_oldest_pending(&self) -> Result<Option<Capture>> {
        Capture::find_oldest_pending(&self.pool).await
    }

    async fn try_claim(&self, id: Uuid) -> Result<bool> {
        let claimed = Capture::claim(id, &self.pool).await?;
        debug!(capture_id = %id, claimed, "claim attempt");
        Ok(claimed)
    }

    async fn save(&self, capture: &Capture) -> Result<()> {
        capture.validate()?;

        if capture.update(&self.pool).await?.is_none() {
            bail!(
                "capture {}: not found or refusing status change to {}",
                capture.id_capture,
                capture.status
            );
        }
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
        if !Capture::mark_terminal(id, status, ended, &self.pool).await? {
            bail!(
                "capture {}: not found or refusing status change to {}",
                id,
                status
            );
        }
        Ok(())
    }
}
