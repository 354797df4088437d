//! Append-only audit records: fetch snapshots, run logs, change events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable snapshot of a fetch that produced content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub url: String,
    pub content_digest: String,
    pub scraped_at: DateTime<Utc>,
    pub summary: Option<String>,
    /// True iff the digest differed from the page's digest before this
    /// entry was written. False on the first observation of a URL.
    pub changed: bool,
    /// Extracted text retained so a diff view can be built on snapshots.
    pub full_text: String,
}

/// Outcome of a single fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => RunStatus::Success,
            _ => RunStatus::Failed,
        }
    }
}

/// Execution record for one fetch attempt, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRun {
    pub root_url: String,
    pub page_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub bytes_fetched: i64,
    pub change_detected: bool,
}

/// A detected content change. Exists iff the matching history entry
/// has `changed = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub root_url: String,
    pub page_url: String,
    pub detected_at: DateTime<Utc>,
    pub change_type: String,
    pub relevance_score: i64,
    pub diff_summary: String,
}

impl ChangeEvent {
    /// Default classification for a digest mismatch.
    pub const CONTENT_UPDATE: &'static str = "content_update";
    /// Default relevance until scoring is informed by something smarter.
    pub const DEFAULT_RELEVANCE: i64 = 5;
}
