use tracing::{info, warn};

use crate::domains::captures::error::CaptureError;
use crate::domains::captures::models::{Capture, CaptureStatus};
use crate::kernel::BaseCaptureStore;

#[derive(Debug)]
pub enum ClaimOutcome {
    /// This worker owns the capture; its status is now `started`
    Claimed(Capture),
    /// Someone else moved the capture out of `pending` first
    Lost,
}

/// Compare-and-swap the candidate from `pending` to `started`.
pub async fn claim_capture(
    store: &dyn BaseCaptureStore,
    candidate: &Capture,
) -> Result<ClaimOutcome, CaptureError> {
    if !store.try_claim(candidate.id_capture).await? {
        info!(capture_id = %candidate.id_capture, "capture already claimed elsewhere");
        return Ok(ClaimOutcome::Lost);
    }

    let mut claimed = candidate.clone();
    claimed.status = CaptureStatus::Started;
    Ok(ClaimOutcome::Claimed(claimed))
}

/// Reload the claimed record and stamp `started_timestamp`.
///
/// On error `capture` keeps its previous contents, still usable to record a failure.
pub async fn stamp_started(
    store: &dyn BaseCaptureStore,
    capture: &mut Capture,
) -> Result<(), CaptureError> {
    let mut fresh = store.find_by_id(capture.id_capture).await?;
    if fresh.status != CaptureStatus::Started {
        warn!(
            capture_id = %capture.id_capture,
            status = %fresh.status,
            "claimed capture changed status underneath us"
        );
        return Err(CaptureError::InvalidTransition {
            from: fresh.status,
            to: CaptureStatus::Started,
        });
    }

    fresh.mark_started();
    store.save(&fresh).await?;
    *capture = fresh;
    Ok(())
}
