//! Capture model: one queued request to archive a URL.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::domains::captures::error::CaptureError;

// ============================================================================
// Status
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default,
)]
#[sqlx(type_name = "capture_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    #[default]
    Pending,
    Started,
    Success,
    Failed,
}

impl CaptureStatus {
    pub const ALL: [CaptureStatus; 4] = [
        CaptureStatus::Pending,
        CaptureStatus::Started,
        CaptureStatus::Success,
        CaptureStatus::Failed,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureStatus::Success | CaptureStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            CaptureStatus::Pending => 0,
            CaptureStatus::Started => 1,
            CaptureStatus::Success | CaptureStatus::Failed => 2,
        }
    }

    /// Status only moves forward: pending → started → success | failed.
    pub fn can_transition_to(&self, next: CaptureStatus) -> bool {
        *self == next || next.rank() > self.rank()
    }

    /// Stored statuses that `self` may overwrite.
    pub fn allowed_predecessors(&self) -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|current| current.can_transition_to(*self))
            .map(CaptureStatus::as_str)
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureStatus::Pending => "pending",
            CaptureStatus::Started => "started",
            CaptureStatus::Success => "success",
            CaptureStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Capture Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Capture {
    #[builder(default = Uuid::now_v7())]
    pub id_capture: Uuid,

    // Request
    pub url: String,
    #[builder(default, setter(strip_option))]
    pub callback_url: Option<String>,

    // State
    #[builder(default)]
    pub status: CaptureStatus,
    #[builder(default = Utc::now())]
    pub created_timestamp: DateTime<Utc>,
    #[builder(default)]
    pub started_timestamp: Option<DateTime<Utc>>,
    #[builder(default)]
    pub ended_timestamp: Option<DateTime<Utc>>,

    // Engine run
    #[builder(default)]
    pub stdout_logs: Option<String>,
    #[builder(default)]
    pub stderr_logs: Option<String>,
    #[builder(default)]
    pub exit_code: Option<i32>,
    #[builder(default)]
    pub summary: Option<serde_json::Value>,
}

impl Capture {
    /// Create a pending capture for a URL.
    pub fn new(url: impl Into<String>, callback_url: Option<String>) -> Self {
        let mut capture = Self::builder().url(url).build();
        capture.callback_url = callback_url;
        capture
    }

    /// Record the claim time. Only the first call has an effect.
    pub fn mark_started(&mut self) {
        if self.started_timestamp.is_none() {
            self.started_timestamp = Some(Utc::now());
        }
    }

    /// Keep what the engine reported, whatever the outcome.
    ///
    /// NUL characters are dropped; Postgres text columns cannot hold them.
    pub fn record_run(&mut self, exit_code: Option<i32>, stdout: String, stderr: String) {
        self.exit_code = exit_code;
        self.stdout_logs = Some(strip_nul(stdout));
        self.stderr_logs = Some(strip_nul(stderr));
    }

    /// Keep the engine's summary, minus any NUL characters.
    pub fn record_summary(&mut self, summary: Option<serde_json::Value>) {
        self.summary = summary.map(strip_nul_from_json);
    }

    /// Whether any stored text would be rejected by a Postgres text or jsonb column.
    pub fn contains_nul(&self) -> bool {
        [
            Some(self.url.as_str()),
            self.callback_url.as_deref(),
            self.stdout_logs.as_deref(),
            self.stderr_logs.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|text| text.contains('\0'))
            || self.summary.as_ref().is_some_and(json_contains_nul)
    }

    /// Move to a terminal status and stamp `ended_timestamp`.
    pub fn finish(&mut self, status: CaptureStatus) -> Result<(), CaptureError> {
        if !status.is_terminal() || !self.status.can_transition_to(status) {
            return Err(CaptureError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.ended_timestamp = Some(Utc::now());
        Ok(())
    }

    /// Record-level invariants checked before every write.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.ended_timestamp.is_some() && !self.status.is_terminal() {
            return Err(CaptureError::InvalidTransition {
                from: self.status,
                to: self.status,
            });
        }
        Ok(())
    }
}

fn strip_nul(text: String) -> String {
    if text.contains('\0') {
        text.replace('\0', "")
    } else {
        text
    }
}

fn strip_nul_from_json(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::String(text) => Value::String(strip_nul(text)),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nul_from_json).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (strip_nul(key), strip_nul_from_json(value)))
                .collect(),
        ),
        other => other,
    }
}

fn json_contains_nul(value: &serde_json::Value) -> bool {
    use serde_json::Value;

    match value {
        Value::String(text) => text.contains('\0'),
        Value::Array(items) => items.iter().any(json_contains_nul),
        Value::Object(map) => map
            .iter()
            .any(|(key, value)| key.contains('\0') || json_contains_nul(value)),
        _ => false,
    }
}

// ============================================================================
// Queries
// ============================================================================

impl Capture {
    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO captures (
                id_capture, url, callback_url, status, created_timestamp, started_timestamp,
                ended_timestamp, stdout_logs, stderr_logs, exit_code, summary
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(self.id_capture)
        .bind(&self.url)
        .bind(&self.callback_url)
        .bind(self.status)
        .bind(self.created_timestamp)
        .bind(self.started_timestamp)
        .bind(self.ended_timestamp)
        .bind(&self.stdout_logs)
        .bind(&self.stderr_logs)
        .bind(self.exit_code)
        .bind(&self.summary)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM captures WHERE id_capture = $1")
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(Into::into)
    }

    /// Oldest pending capture, ties broken by id.
    pub async fn find_oldest_pending(pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT *
            FROM captures
            WHERE status = 'pending'
            ORDER BY created_timestamp ASC, id_capture ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Compare-and-swap `pending` → `started`. Returns false if another worker got there first.
    pub async fn claim(id: Uuid, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE captures
            SET status = 'started'
            WHERE id_capture = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Write the record back unless the stored status is past `self.status`.
    ///
    /// Returns `None` when the row is missing or the status would regress.
    pub async fn update(&self, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE captures SET
                url = $1, callback_url = $2, status = $3, started_timestamp = $4,
                ended_timestamp = $5, stdout_logs = $6, stderr_logs = $7, exit_code = $8,
                summary = $9
            WHERE id_capture = $10 AND status::text = ANY($11)
            RETURNING *
            "#,
        )
        .bind(&self.url)
        .bind(&self.callback_url)
        .bind(self.status)
        .bind(self.started_timestamp)
        .bind(self.ended_timestamp)
        .bind(&self.stdout_logs)
        .bind(&self.stderr_logs)
        .bind(self.exit_code)
        .bind(&self.summary)
        .bind(self.id_capture)
        .bind(self.status.allowed_predecessors())
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Set only the terminal status and end time. Returns false if nothing was updated.
    pub async fn mark_terminal(
        id: Uuid,
        status: CaptureStatus,
        ended: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE captures
            SET status = $1, ended_timestamp = $2
            WHERE id_capture = $3 AND status::text = ANY($4)
            "#,
        )
        .bind(status)
        .bind(ended)
        .bind(id)
        .bind(status.allowed_predecessors())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
