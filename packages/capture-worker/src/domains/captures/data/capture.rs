use crate::domains::captures::models::Capture;
use serde::{Deserialize, Serialize};

/// Read-facing representation of a capture; also the webhook body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureData {
    pub id_capture: String,
    pub url: String,
    pub status: String,
    pub callback_url: Option<String>,
    pub created_timestamp: String,
    pub started_timestamp: Option<String>,
    pub ended_timestamp: Option<String>,
    pub exit_code: Option<i32>,
    pub summary: Option<serde_json::Value>,
    pub stdout_logs: Option<String>,
    pub stderr_logs: Option<String>,
}

impl From<&Capture> for CaptureData {
    fn from(capture: &Capture) -> Self {
        Self {
            id_capture: capture.id_capture.to_string(),
            url: capture.url.clone(),
            status: capture.status.to_string(),
            callback_url: capture.callback_url.clone(),
            created_timestamp: capture.created_timestamp.to_rfc3339(),
            started_timestamp: capture.started_timestamp.map(|t| t.to_rfc3339()),
            ended_timestamp: capture.ended_timestamp.map(|t| t.to_rfc3339()),
            exit_code: capture.exit_code,
            summary: capture.summary.clone(),
            stdout_logs: capture.stdout_logs.clone(),
            stderr_logs: capture.stderr_logs.clone(),
        }
    }
}
