//! SQLite repository for pages, history, run logs, change events,
//! schedules, and site summaries.
//!
//! Connections are opened per call against a single database file. WAL mode
//! plus a busy timeout keep concurrent crawl tasks from tripping over each
//! other on the benign same-root race.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use thiserror::Error;

use crate::models::{
    ChangeEvent, HistoryEntry, IntervalUnit, Page, RunStatus, Schedule, ScrapeRun, SiteSummary,
};

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Format a timestamp for storage. Fixed-width fractional seconds so that
/// lexicographic comparison in SQL matches chronological order.
fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp, defaulting to the Unix epoch on error.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional stored timestamp.
fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

/// SQLite-backed store for all monitoring state.
#[derive(Debug, Clone)]
pub struct MonitorRepository {
    db_path: PathBuf,
}

impl MonitorRepository {
    /// Open (creating if needed) the database at `db_path`.
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            -- Latest known state per URL
            CREATE TABLE IF NOT EXISTS pages (
                url TEXT PRIMARY KEY,
                root_url TEXT,
                content_digest TEXT NOT NULL,
                last_scraped_at TEXT NOT NULL,
                summary TEXT
            );

            -- Append-only snapshot log, keyed by URL
            CREATE TABLE IF NOT EXISTS scrape_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                content_digest TEXT NOT NULL,
                scraped_at TEXT NOT NULL,
                summary TEXT,
                changed INTEGER NOT NULL DEFAULT 0,
                full_text TEXT NOT NULL DEFAULT ''
            );

            -- Append-only fetch execution log
            CREATE TABLE IF NOT EXISTS scrape_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                root_url TEXT NOT NULL,
                page_url TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                status TEXT NOT NULL,
                bytes_fetched INTEGER NOT NULL DEFAULT 0,
                change_detected INTEGER NOT NULL DEFAULT 0
            );

            -- Append-only change log
            CREATE TABLE IF NOT EXISTS change_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                root_url TEXT NOT NULL,
                page_url TEXT NOT NULL,
                detected_at TEXT NOT NULL,
                change_type TEXT NOT NULL,
                relevance_score INTEGER NOT NULL,
                diff_summary TEXT NOT NULL
            );

            -- One recurring-crawl policy per root
            CREATE TABLE IF NOT EXISTS schedules (
                root_url TEXT PRIMARY KEY,
                interval_value INTEGER NOT NULL,
                interval_unit TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1
            );

            -- One AI synthesis per root
            CREATE TABLE IF NOT EXISTS site_summaries (
                root_url TEXT PRIMARY KEY,
                summary TEXT NOT NULL,
                last_updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_pages_root ON pages(root_url);
            CREATE INDEX IF NOT EXISTS idx_history_url ON scrape_history(url, scraped_at);
            CREATE INDEX IF NOT EXISTS idx_history_changed ON scrape_history(changed, scraped_at);
            CREATE INDEX IF NOT EXISTS idx_runs_started ON scrape_runs(started_at);
            CREATE INDEX IF NOT EXISTS idx_runs_root ON scrape_runs(root_url, started_at);
            CREATE INDEX IF NOT EXISTS idx_events_detected ON change_events(detected_at);
            CREATE INDEX IF NOT EXISTS idx_events_root ON change_events(root_url, detected_at);
            "#,
        )?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Pages
    // -------------------------------------------------------------------------

    /// Insert or update a page. Keeps an existing root when the new one is
    /// absent, so re-scrapes without root context never orphan a page.
    pub fn upsert_page(&self, page: &Page) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO pages (url, root_url, content_digest, last_scraped_at, summary)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(url) DO UPDATE SET
                content_digest = excluded.content_digest,
                last_scraped_at = excluded.last_scraped_at,
                summary = excluded.summary,
                root_url = COALESCE(excluded.root_url, pages.root_url)
            "#,
            params![
                page.url,
                page.root_url,
                page.content_digest,
                fmt_ts(page.last_scraped_at),
                page.summary,
            ],
        )?;
        Ok(())
    }

    /// Get a page's latest known state.
    pub fn get_page(&self, url: &str) -> Result<Option<Page>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT url, root_url, content_digest, last_scraped_at, summary FROM pages WHERE url = ?",
        )?;
        match stmt.query_row(params![url], row_to_page) {
            Ok(page) => Ok(Some(page)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All pages, ordered by root then URL.
    pub fn list_pages(&self) -> Result<Vec<Page>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT url, root_url, content_digest, last_scraped_at, summary FROM pages
             ORDER BY root_url, url",
        )?;
        let pages = stmt
            .query_map([], row_to_page)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pages)
    }

    /// Non-empty page summaries for one root, ordered by URL.
    pub fn page_summaries_for_root(&self, root_url: &str) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT summary FROM pages
             WHERE root_url = ? AND summary IS NOT NULL AND summary != ''
             ORDER BY url",
        )?;
        let summaries = stmt
            .query_map(params![root_url], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    // -------------------------------------------------------------------------
    // History
    // -------------------------------------------------------------------------

    /// Append one snapshot. History is never rewritten.
    pub fn append_history(&self, entry: &HistoryEntry) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO scrape_history (url, content_digest, scraped_at, summary, changed, full_text)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                entry.url,
                entry.content_digest,
                fmt_ts(entry.scraped_at),
                entry.summary,
                entry.changed,
                entry.full_text,
            ],
        )?;
        Ok(())
    }

    /// Most recent snapshots for one URL, newest first.
    pub fn history_for_url(&self, url: &str, limit: u32) -> Result<Vec<HistoryEntry>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT url, content_digest, scraped_at, summary, changed, full_text
             FROM scrape_history WHERE url = ?
             ORDER BY scraped_at DESC, id DESC LIMIT ?",
        )?;
        let entries = stmt
            .query_map(params![url, limit], row_to_history)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Snapshots with `changed = true` at or after `start`, newest first.
    pub fn changed_history_since(
        &self,
        start: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<HistoryEntry>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT url, content_digest, scraped_at, summary, changed, full_text
             FROM scrape_history WHERE changed = 1 AND scraped_at >= ?
             ORDER BY scraped_at DESC, id DESC LIMIT ?",
        )?;
        let entries = stmt
            .query_map(params![fmt_ts(start), limit], row_to_history)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // -------------------------------------------------------------------------
    // Runs and change events
    // -------------------------------------------------------------------------

    /// Append one fetch execution record.
    pub fn append_run(&self, run: &ScrapeRun) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO scrape_runs
                (root_url, page_url, started_at, finished_at, status, bytes_fetched, change_detected)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                run.root_url,
                run.page_url,
                fmt_ts(run.started_at),
                run.finished_at.map(fmt_ts),
                run.status.as_str(),
                run.bytes_fetched,
                run.change_detected,
            ],
        )?;
        Ok(())
    }

    /// Runs started at or after `start`, in insertion order.
    pub fn runs_since(&self, start: DateTime<Utc>) -> Result<Vec<ScrapeRun>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT root_url, page_url, started_at, finished_at, status, bytes_fetched, change_detected
             FROM scrape_runs WHERE started_at >= ? ORDER BY id",
        )?;
        let runs = stmt
            .query_map(params![fmt_ts(start)], row_to_run)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// Append one change event.
    pub fn append_change_event(&self, event: &ChangeEvent) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO change_events
                (root_url, page_url, detected_at, change_type, relevance_score, diff_summary)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                event.root_url,
                event.page_url,
                fmt_ts(event.detected_at),
                event.change_type,
                event.relevance_score,
                event.diff_summary,
            ],
        )?;
        Ok(())
    }

    /// Change events detected at or after `start`, in insertion order.
    pub fn changes_since(&self, start: DateTime<Utc>) -> Result<Vec<ChangeEvent>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT root_url, page_url, detected_at, change_type, relevance_score, diff_summary
             FROM change_events WHERE detected_at >= ? ORDER BY id",
        )?;
        let events = stmt
            .query_map(params![fmt_ts(start)], row_to_change_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    // -------------------------------------------------------------------------
    // Schedules and site summaries
    // -------------------------------------------------------------------------

    /// Insert or replace the schedule for a root. At most one row per root.
    pub fn upsert_schedule(&self, schedule: &Schedule) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO schedules (root_url, interval_value, interval_unit, active)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(root_url) DO UPDATE SET
                interval_value = excluded.interval_value,
                interval_unit = excluded.interval_unit,
                active = excluded.active
            "#,
            params![
                schedule.root_url,
                schedule.interval_value,
                schedule.interval_unit.as_str(),
                schedule.active,
            ],
        )?;
        Ok(())
    }

    /// Get the schedule for one root.
    pub fn get_schedule(&self, root_url: &str) -> Result<Option<Schedule>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT root_url, interval_value, interval_unit, active FROM schedules WHERE root_url = ?",
        )?;
        match stmt.query_row(params![root_url], row_to_schedule) {
            Ok(schedule) => Ok(Some(schedule)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All schedules, active or not.
    pub fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT root_url, interval_value, interval_unit, active FROM schedules ORDER BY root_url",
        )?;
        let schedules = stmt
            .query_map([], row_to_schedule)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(schedules)
    }

    /// Insert or replace the site summary for a root.
    pub fn upsert_site_summary(&self, root_url: &str, summary: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO site_summaries (root_url, summary, last_updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(root_url) DO UPDATE SET
                summary = excluded.summary,
                last_updated_at = excluded.last_updated_at
            "#,
            params![root_url, summary, fmt_ts(Utc::now())],
        )?;
        Ok(())
    }

    /// Get the site summary for one root.
    pub fn get_site_summary(&self, root_url: &str) -> Result<Option<SiteSummary>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT root_url, summary, last_updated_at FROM site_summaries WHERE root_url = ?",
        )?;
        let result = stmt.query_row(params![root_url], |row| {
            Ok(SiteSummary {
                root_url: row.get(0)?,
                summary: row.get(1)?,
                last_updated_at: parse_datetime(&row.get::<_, String>(2)?),
            })
        });
        match result {
            Ok(summary) => Ok(Some(summary)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // -------------------------------------------------------------------------
    // Deletion
    // -------------------------------------------------------------------------

    /// Delete everything owned by a root: its pages, their history, the site
    /// summary, the schedule, and the run/event logs. Returns how many pages
    /// were removed.
    pub fn delete_root(&self, root_url: &str) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let page_count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM pages WHERE root_url = ?",
            params![root_url],
            |row| row.get(0),
        )?;

        // History rows are keyed by URL; resolve ownership through pages
        // before the pages themselves go away.
        tx.execute(
            "DELETE FROM scrape_history WHERE url IN (SELECT url FROM pages WHERE root_url = ?)",
            params![root_url],
        )?;
        tx.execute("DELETE FROM pages WHERE root_url = ?", params![root_url])?;
        tx.execute(
            "DELETE FROM site_summaries WHERE root_url = ?",
            params![root_url],
        )?;
        tx.execute("DELETE FROM schedules WHERE root_url = ?", params![root_url])?;
        tx.execute(
            "DELETE FROM scrape_runs WHERE root_url = ?",
            params![root_url],
        )?;
        tx.execute(
            "DELETE FROM change_events WHERE root_url = ?",
            params![root_url],
        )?;

        tx.commit()?;
        Ok(page_count as usize)
    }
}

// -------------------------------------------------------------------------
// Row mapping
// -------------------------------------------------------------------------

fn row_to_page(row: &Row<'_>) -> rusqlite::Result<Page> {
    Ok(Page {
        url: row.get(0)?,
        root_url: row.get(1)?,
        content_digest: row.get(2)?,
        last_scraped_at: parse_datetime(&row.get::<_, String>(3)?),
        summary: row.get(4)?,
    })
}

fn row_to_history(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    Ok(HistoryEntry {
        url: row.get(0)?,
        content_digest: row.get(1)?,
        scraped_at: parse_datetime(&row.get::<_, String>(2)?),
        summary: row.get(3)?,
        changed: row.get(4)?,
        full_text: row.get(5)?,
    })
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<ScrapeRun> {
    Ok(ScrapeRun {
        root_url: row.get(0)?,
        page_url: row.get(1)?,
        started_at: parse_datetime(&row.get::<_, String>(2)?),
        finished_at: parse_datetime_opt(row.get(3)?),
        status: RunStatus::parse(&row.get::<_, String>(4)?),
        bytes_fetched: row.get(5)?,
        change_detected: row.get(6)?,
    })
}

fn row_to_change_event(row: &Row<'_>) -> rusqlite::Result<ChangeEvent> {
    Ok(ChangeEvent {
        root_url: row.get(0)?,
        page_url: row.get(1)?,
        detected_at: parse_datetime(&row.get::<_, String>(2)?),
        change_type: row.get(3)?,
        relevance_score: row.get(4)?,
        diff_summary: row.get(5)?,
    })
}

fn row_to_schedule(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    Ok(Schedule {
        root_url: row.get(0)?,
        interval_value: row.get(1)?,
        interval_unit: IntervalUnit::parse(&row.get::<_, String>(2)?),
        active: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn temp_repo() -> (tempfile::TempDir, MonitorRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = MonitorRepository::new(&dir.path().join("test.db")).unwrap();
        (dir, repo)
    }

    fn page(url: &str, root: &str, digest: &str) -> Page {
        Page {
            url: url.to_string(),
            root_url: Some(root.to_string()),
            content_digest: digest.to_string(),
            last_scraped_at: Utc::now(),
            summary: Some(format!("summary of {url}")),
        }
    }

    #[test]
    fn test_upsert_page_is_idempotent_on_url() {
        let (_dir, repo) = temp_repo();
        repo.upsert_page(&page("https://ex.test/a", "https://ex.test/", "d1"))
            .unwrap();
        repo.upsert_page(&page("https://ex.test/a", "https://ex.test/", "d2"))
            .unwrap();

        let pages = repo.list_pages().unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].content_digest, "d2");
    }

    #[test]
    fn test_upsert_page_keeps_root_when_absent() {
        let (_dir, repo) = temp_repo();
        repo.upsert_page(&page("https://ex.test/a", "https://ex.test/", "d1"))
            .unwrap();
        let mut update = page("https://ex.test/a", "", "d2");
        update.root_url = None;
        repo.upsert_page(&update).unwrap();

        let stored = repo.get_page("https://ex.test/a").unwrap().unwrap();
        assert_eq!(stored.root_url.as_deref(), Some("https://ex.test/"));
    }

    #[test]
    fn test_history_is_append_only_and_ordered() {
        let (_dir, repo) = temp_repo();
        let base = Utc::now();
        for i in 0..3 {
            repo.append_history(&HistoryEntry {
                url: "https://ex.test/a".into(),
                content_digest: format!("d{i}"),
                scraped_at: base + Duration::seconds(i),
                summary: None,
                changed: i > 0,
                full_text: format!("text {i}"),
            })
            .unwrap();
        }

        let entries = repo.history_for_url("https://ex.test/a", 10).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].content_digest, "d2");
        assert_eq!(entries[2].content_digest, "d0");
        assert!(!entries[2].changed);
    }

    #[test]
    fn test_schedule_upsert_keeps_single_row() {
        let (_dir, repo) = temp_repo();
        let mut sched = Schedule {
            root_url: "https://ex.test/".into(),
            interval_value: 5,
            interval_unit: IntervalUnit::Minutes,
            active: true,
        };
        repo.upsert_schedule(&sched).unwrap();
        sched.interval_value = 30;
        sched.interval_unit = IntervalUnit::Seconds;
        repo.upsert_schedule(&sched).unwrap();

        let schedules = repo.list_schedules().unwrap();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].interval_value, 30);
        assert_eq!(schedules[0].interval_unit, IntervalUnit::Seconds);
    }

    #[test]
    fn test_delete_root_removes_owned_rows_and_counts_pages() {
        let (_dir, repo) = temp_repo();
        let root = "https://ex.test/";
        for path in ["a", "b"] {
            let url = format!("https://ex.test/{path}");
            repo.upsert_page(&page(&url, root, "d1")).unwrap();
            repo.append_history(&HistoryEntry {
                url: url.clone(),
                content_digest: "d1".into(),
                scraped_at: Utc::now(),
                summary: None,
                changed: false,
                full_text: String::new(),
            })
            .unwrap();
            repo.append_run(&ScrapeRun {
                root_url: root.into(),
                page_url: url.clone(),
                started_at: Utc::now(),
                finished_at: Some(Utc::now()),
                status: RunStatus::Success,
                bytes_fetched: 100,
                change_detected: false,
            })
            .unwrap();
        }
        repo.append_change_event(&ChangeEvent {
            root_url: root.into(),
            page_url: "https://ex.test/a".into(),
            detected_at: Utc::now(),
            change_type: ChangeEvent::CONTENT_UPDATE.into(),
            relevance_score: ChangeEvent::DEFAULT_RELEVANCE,
            diff_summary: "changed".into(),
        })
        .unwrap();
        repo.upsert_schedule(&Schedule {
            root_url: root.into(),
            interval_value: 1,
            interval_unit: IntervalUnit::Hours,
            active: true,
        })
        .unwrap();
        repo.upsert_site_summary(root, "a site").unwrap();

        // Unrelated root survives.
        repo.upsert_page(&page("https://other.test/", "https://other.test/", "dx"))
            .unwrap();

        let deleted = repo.delete_root(root).unwrap();
        assert_eq!(deleted, 2);
        assert!(repo.get_page("https://ex.test/a").unwrap().is_none());
        assert!(repo.history_for_url("https://ex.test/a", 10).unwrap().is_empty());
        assert!(repo.get_schedule(root).unwrap().is_none());
        assert!(repo.get_site_summary(root).unwrap().is_none());
        let window_start = Utc::now() - Duration::hours(1);
        assert!(repo.runs_since(window_start).unwrap().is_empty());
        assert!(repo.changes_since(window_start).unwrap().is_empty());
        assert!(repo.get_page("https://other.test/").unwrap().is_some());
    }

    #[test]
    fn test_windowed_queries_filter_by_start() {
        let (_dir, repo) = temp_repo();
        let now = Utc::now();
        for (offset_hours, url) in [(48i64, "old"), (1, "recent")] {
            repo.append_run(&ScrapeRun {
                root_url: "https://ex.test/".into(),
                page_url: format!("https://ex.test/{url}"),
                started_at: now - Duration::hours(offset_hours),
                finished_at: None,
                status: RunStatus::Success,
                bytes_fetched: 0,
                change_detected: false,
            })
            .unwrap();
        }

        let runs = repo.runs_since(now - Duration::hours(24)).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].page_url, "https://ex.test/recent");
    }
}
