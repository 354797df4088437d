//! Page and site-level summary models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest known state of one monitored URL.
///
/// Created on the first successful fetch and updated in place on every
/// subsequent fetch. The per-snapshot audit trail lives in `HistoryEntry`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Normalized URL; globally unique.
    pub url: String,
    /// Root URL of the site this page belongs to. Pages recorded before
    /// root tracking existed may have none and group as "uncategorized".
    pub root_url: Option<String>,
    /// SHA-256 digest of the last extracted text.
    pub content_digest: String,
    pub last_scraped_at: DateTime<Utc>,
    pub summary: Option<String>,
}

/// AI-generated synthesis of every page under one root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSummary {
    pub root_url: String,
    pub summary: String,
    pub last_updated_at: DateTime<Utc>,
}
