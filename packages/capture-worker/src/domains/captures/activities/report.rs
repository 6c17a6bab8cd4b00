use chrono::Utc;
use tracing::{info, warn};

use crate::domains::captures::data::CaptureData;
use crate::domains::captures::error::CaptureError;
use crate::domains::captures::models::{Capture, CaptureStatus};
use crate::kernel::{BaseCaptureStore, BaseWebhookNotifier};

/// Move the capture to its terminal status and persist the whole record.
///
/// If the full record is refused, the terminal status and end time are written alone.
pub async fn finalize(
    store: &dyn BaseCaptureStore,
    capture: &mut Capture,
    status: CaptureStatus,
) -> Result<(), CaptureError> {
    capture.finish(status)?;

    let Err(save_error) = store.save(capture).await else {
        return Ok(());
    };
    warn!(
        error = %format!("{save_error:#}"),
        "could not save full capture record, recording terminal status only"
    );

    let ended = capture.ended_timestamp.unwrap_or_else(Utc::now);
    store
        .mark_terminal(capture.id_capture, status, ended)
        .await
        .map_err(|e| {
            warn!(error = %format!("{e:#}"), "terminal status fallback failed");
            CaptureError::from(save_error)
        })
}

/// POST the final record to the capture's callback URL, once.
///
/// Delivery failures are logged and never change the capture.
pub async fn notify_callback(notifier: &dyn BaseWebhookNotifier, capture: &Capture) {
    let Some(callback_url) = capture.callback_url.as_deref() else {
        return;
    };

    let payload = match serde_json::to_value(CaptureData::from(capture)) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "could not serialize webhook payload");
            return;
        }
    };

    match notifier.notify(callback_url, &payload).await {
        Ok(()) => info!(callback_url, "webhook delivered"),
        Err(e) => warn!(callback_url, error = %format!("{e:#}"), "webhook delivery failed"),
    }
}
