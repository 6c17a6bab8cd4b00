use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::domains::captures::error::CaptureError;

/// Archive container the engine is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Web archive collection zip: WARC plus index and page list
    Wacz,
    /// Bare gzipped WARC
    WarcGzipped,
}

impl ArchiveFormat {
    /// Value of the engine's `--format` flag
    pub fn engine_name(&self) -> &'static str {
        match self {
            ArchiveFormat::Wacz => "wacz",
            ArchiveFormat::WarcGzipped => "warc-gzipped",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Wacz => "wacz",
            ArchiveFormat::WarcGzipped => "warc.gz",
        }
    }
}

/// Per-capture directory tree under the storage root.
///
/// ```text
/// <storage>/<id_capture>/
///     archive.wacz | archive.warc.gz
///     archive.json
///     attachments/
/// ```
#[derive(Debug, Clone)]
pub struct CaptureWorkspace {
    pub root: PathBuf,
    pub attachments_dir: PathBuf,
    pub archive_path: PathBuf,
    pub summary_path: PathBuf,
    pub format: ArchiveFormat,
}

impl CaptureWorkspace {
    pub fn for_capture(storage_root: &Path, id_capture: Uuid, format: ArchiveFormat) -> Self {
        let root = storage_root.join(id_capture.to_string());
        Self {
            attachments_dir: root.join("attachments"),
            archive_path: root.join(format!("archive.{}", format.file_extension())),
            summary_path: root.join("archive.json"),
            root,
            format,
        }
    }

    /// Create the capture root and its attachments folder.
    pub async fn create(&self) -> Result<(), CaptureError> {
        tokio::fs::create_dir_all(&self.attachments_dir)
            .await
            .map_err(|source| CaptureError::Workspace {
                path: self.attachments_dir.clone(),
                source,
            })?;
        debug!(root = %self.root.display(), "capture workspace ready");
        Ok(())
    }
}
