//! Post-run artifact checks.
//!
//! A capture only counts when the archive, the JSON summary and every
//! attachment the summary lists are actually on disk.

use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::workspace::CaptureWorkspace;
use crate::domains::captures::error::CaptureError;

/// One entry of the summary's `attachments` map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AttachmentEntry {
    Single(String),
    Many(Vec<String>),
}

#[derive(Debug, Default)]
pub struct ArtifactReport {
    /// Parsed summary, kept even when other checks fail
    pub summary: Option<Value>,
    /// Missing paths in check order: archive, summary, then attachments
    pub missing: Vec<PathBuf>,
    /// Why the summary could not be used, if it could not
    pub malformed: Option<String>,
}

impl ArtifactReport {
    /// Missing files win over a malformed summary; the first missing path is the reason.
    pub fn into_result(self, summary_path: &Path) -> Result<(), CaptureError> {
        if let Some(path) = self.missing.into_iter().next() {
            return Err(CaptureError::MissingArtifact { path });
        }
        if let Some(reason) = self.malformed {
            return Err(CaptureError::MalformedManifest {
                path: summary_path.to_path_buf(),
                reason,
            });
        }
        Ok(())
    }
}

async fn exists(path: &Path) -> bool {
    match tokio::fs::try_exists(path).await {
        Ok(found) => found,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not check artifact");
            false
        }
    }
}

/// Attachment names must stay inside the attachments folder.
fn is_contained(filename: &str) -> bool {
    let mut components = Path::new(filename).components().peekable();
    components.peek().is_some() && components.all(|c| matches!(c, Component::Normal(_)))
}

fn expected_attachments(summary: &Value) -> Result<Vec<String>, String> {
    let attachments = summary
        .get("attachments")
        .ok_or_else(|| "no `attachments` field".to_string())?;
    let entries: serde_json::Map<String, Value> = match attachments {
        Value::Object(map) => map.clone(),
        _ => return Err("`attachments` is not an object".to_string()),
    };

    let mut filenames = Vec::new();
    for (kind, entry) in entries {
        match serde_json::from_value::<AttachmentEntry>(entry) {
            Ok(AttachmentEntry::Single(name)) => filenames.push(name),
            Ok(AttachmentEntry::Many(names)) => filenames.extend(names),
            Err(_) => return Err(format!("attachment `{kind}` is not a filename or list of filenames")),
        }
    }
    Ok(filenames)
}

/// Inspect everything the engine was expected to write into `workspace`.
pub async fn verify_artifacts(workspace: &CaptureWorkspace) -> ArtifactReport {
    let mut report = ArtifactReport::default();

    if !exists(&workspace.archive_path).await {
        report.missing.push(workspace.archive_path.clone());
    }

    if !exists(&workspace.summary_path).await {
        report.missing.push(workspace.summary_path.clone());
        return report;
    }

    let summary = match tokio::fs::read(&workspace.summary_path).await {
        Ok(bytes) => serde_json::from_slice::<Value>(&bytes).map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    let summary = match summary {
        Ok(summary) => summary,
        Err(reason) => {
            report.malformed = Some(reason);
            return report;
        }
    };

    let expected = expected_attachments(&summary);
    report.summary = Some(summary);

    let filenames = match expected {
        Ok(filenames) => filenames,
        Err(reason) => {
            report.malformed = Some(reason);
            return report;
        }
    };

    debug!(count = filenames.len(), "checking attachments");
    for filename in filenames {
        let path = workspace.attachments_dir.join(&filename);
        if !is_contained(&filename) {
            warn!(filename = %filename, "attachment name points outside the attachments folder");
            report.missing.push(path);
        } else if !exists(&path).await {
            warn!(path = %path.display(), "attachment listed in summary is missing");
            report.missing.push(path);
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::captures::activities::ArchiveFormat;
    use serde_json::json;
    use uuid::Uuid;

    async fn workspace() -> (tempfile::TempDir, CaptureWorkspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = CaptureWorkspace::for_capture(dir.path(), Uuid::new_v4(), ArchiveFormat::Wacz);
        ws.create().await.unwrap();
        (dir, ws)
    }

    fn write_summary(ws: &CaptureWorkspace, summary: &Value) {
        std::fs::write(&ws.summary_path, serde_json::to_vec(summary).unwrap()).unwrap();
    }

    fn write_attachment(ws: &CaptureWorkspace, name: &str) {
        std::fs::write(ws.attachments_dir.join(name), b"data").unwrap();
    }

    #[tokio::test]
    async fn complete_capture_passes() {
        let (_dir, ws) = workspace().await;
        std::fs::write(&ws.archive_path, b"wacz").unwrap();
        write_summary(
            &ws,
            &json!({"attachments": {"screenshot": "screenshot.png", "certificates": ["cert1.pem", "cert2.pem"]}}),
        );
        for name in ["screenshot.png", "cert1.pem", "cert2.pem"] {
            write_attachment(&ws, name);
        }

        let report = verify_artifacts(&ws).await;

        assert!(report.missing.is_empty());
        assert!(report.malformed.is_none());
        assert_eq!(report.summary.unwrap()["attachments"]["screenshot"], "screenshot.png");
    }

    #[tokio::test]
    async fn every_missing_attachment_is_reported() {
        let (_dir, ws) = workspace().await;
        std::fs::write(&ws.archive_path, b"wacz").unwrap();
        write_summary(
            &ws,
            &json!({"attachments": {"certificates": ["cert1.pem", "cert2.pem"], "screenshot": "shot.png"}}),
        );
        write_attachment(&ws, "cert2.pem");

        let report = verify_artifacts(&ws).await;

        assert_eq!(
            report.missing,
            vec![ws.attachments_dir.join("cert1.pem"), ws.attachments_dir.join("shot.png")]
        );
        assert!(report.summary.is_some());
        let err = report.into_result(&ws.summary_path).unwrap_err();
        assert!(err.failure_reason().contains("cert1.pem not found"));
    }

    #[tokio::test]
    async fn missing_archive_is_the_reported_reason() {
        let (_dir, ws) = workspace().await;
        write_summary(&ws, &json!({"attachments": {}}));

        let report = verify_artifacts(&ws).await;

        assert_eq!(report.missing, vec![ws.archive_path.clone()]);
        assert!(report.summary.is_some());
    }

    #[tokio::test]
    async fn missing_summary_stops_verification() {
        let (_dir, ws) = workspace().await;
        std::fs::write(&ws.archive_path, b"wacz").unwrap();

        let report = verify_artifacts(&ws).await;

        assert_eq!(report.missing, vec![ws.summary_path.clone()]);
        assert!(report.summary.is_none());
    }

    #[tokio::test]
    async fn unparseable_summary_is_malformed() {
        let (_dir, ws) = workspace().await;
        std::fs::write(&ws.archive_path, b"wacz").unwrap();
        std::fs::write(&ws.summary_path, b"{not json").unwrap();

        let report = verify_artifacts(&ws).await;
        let err = report.into_result(&ws.summary_path).unwrap_err();

        assert!(matches!(err, CaptureError::MalformedManifest { .. }));
    }

    #[tokio::test]
    async fn attachments_field_is_required() {
        let (_dir, ws) = workspace().await;
        std::fs::write(&ws.archive_path, b"wacz").unwrap();
        write_summary(&ws, &json!({"url": "https://example.com"}));

        let report = verify_artifacts(&ws).await;

        assert!(report.summary.is_some());
        assert!(report.malformed.is_some());
        assert!(report.into_result(&ws.summary_path).is_err());
    }

    #[tokio::test]
    async fn non_string_attachment_entry_is_malformed() {
        let (_dir, ws) = workspace().await;
        std::fs::write(&ws.archive_path, b"wacz").unwrap();
        write_summary(&ws, &json!({"attachments": {"screenshot": 42}}));

        let report = verify_artifacts(&ws).await;

        assert!(report.malformed.unwrap().contains("screenshot"));
    }

    #[tokio::test]
    async fn attachment_names_cannot_escape_the_attachments_folder() {
        let (dir, ws) = workspace().await;
        std::fs::write(&ws.archive_path, b"wacz").unwrap();
        std::fs::write(dir.path().join("outside.png"), b"data").unwrap();
        let absolute = dir.path().join("outside.png").to_string_lossy().into_owned();
        write_summary(
            &ws,
            &json!({"attachments": {"screenshot": "../../outside.png", "pdf": absolute, "empty": ""}}),
        );

        let report = verify_artifacts(&ws).await;

        assert_eq!(report.missing.len(), 3);
        assert!(report.into_result(&ws.summary_path).is_err());
    }

    #[test]
    fn nested_relative_names_are_contained() {
        assert!(is_contained("screenshot.png"));
        assert!(is_contained("certs/cert1.pem"));
        assert!(!is_contained("../cert1.pem"));
        assert!(!is_contained("/etc/passwd"));
        assert!(!is_contained("./cert1.pem"));
        assert!(!is_contained(""));
    }
}
