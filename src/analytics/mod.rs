//! Windowed analytics over the append-only history, run, and event logs.
//!
//! All aggregation is read-only and computed from whatever the repository
//! returns at query time; a crawl still in flight simply shows up in the
//! next query.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::RunStatus;
use crate::repository::{MonitorRepository, Result};

/// Group key for pages recorded before root tracking existed.
const UNCATEGORIZED: &str = "uncategorized";

/// How many entries the top-N rankings keep.
const TOP_N: usize = 5;

/// How many recent changed snapshots the activity feed shows.
const RECENT_LIMIT: u32 = 20;

/// Supported reporting windows. Unrecognized input falls back to 24 hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    Day,
    Week,
    Fortnight,
}

impl TimeWindow {
    pub fn parse(s: &str) -> Self {
        match s {
            "7d" => TimeWindow::Week,
            "14d" => TimeWindow::Fortnight,
            _ => TimeWindow::Day,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Day => "24h",
            TimeWindow::Week => "7d",
            TimeWindow::Fortnight => "14d",
        }
    }

    fn duration(&self) -> Duration {
        match self {
            TimeWindow::Day => Duration::hours(24),
            TimeWindow::Week => Duration::days(7),
            TimeWindow::Fortnight => Duration::days(14),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Kpis {
    pub total_root_sites: usize,
    pub total_pages: usize,
    pub scrapes_in_window: usize,
    pub changes_in_window: usize,
    pub success_rate: String,
    pub avg_scrape_duration: String,
    pub avg_bytes_fetched: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Trends {
    /// Runs per calendar day, keyed by `YYYY-MM-DD`.
    pub daily_scrapes: BTreeMap<String, usize>,
    /// Change events per calendar day.
    pub daily_changes: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopRoot {
    pub root_url: String,
    pub changes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopPage {
    pub page_url: String,
    pub changes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentChange {
    pub page_url: String,
    pub date: DateTime<Utc>,
    pub summary: Option<String>,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RootInsight {
    pub total_pages: usize,
    pub last_scraped: Option<DateTime<Utc>>,
    pub scrapes_in_window: usize,
    pub changes_in_window: usize,
    pub change_rate: String,
    pub most_active_page: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub window: &'static str,
    pub kpis: Kpis,
    pub trends: Trends,
    pub top_root_sites: Vec<TopRoot>,
    pub top_pages: Vec<TopPage>,
    pub recent_changes: Vec<RecentChange>,
    pub per_root_insights: BTreeMap<String, RootInsight>,
}

/// Build the full report for one window, evaluated at `now`.
pub fn build(
    repo: &MonitorRepository,
    window: TimeWindow,
    now: DateTime<Utc>,
) -> Result<AnalyticsReport> {
    let start = now - window.duration();

    let pages = repo.list_pages()?;
    let runs = repo.runs_since(start)?;
    let changes = repo.changes_since(start)?;
    let recent = repo.changed_history_since(start, RECENT_LIMIT)?;

    // KPIs -------------------------------------------------------------

    let mut roots: HashMap<&str, Vec<&crate::models::Page>> = HashMap::new();
    for page in &pages {
        roots
            .entry(page.root_url.as_deref().unwrap_or(UNCATEGORIZED))
            .or_default()
            .push(page);
    }

    let successful = runs
        .iter()
        .filter(|r| r.status == RunStatus::Success)
        .count();
    let success_rate = if runs.is_empty() {
        0.0
    } else {
        successful as f64 / runs.len() as f64 * 100.0
    };

    let avg_bytes = if runs.is_empty() {
        0
    } else {
        let total: i64 = runs.iter().map(|r| r.bytes_fetched).sum();
        total / runs.len() as i64
    };

    let durations: Vec<f64> = runs
        .iter()
        .filter_map(|r| {
            r.finished_at
                .map(|finished| (finished - r.started_at).num_milliseconds() as f64 / 1000.0)
        })
        .collect();
    let avg_duration = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<f64>() / durations.len() as f64
    };

    let kpis = Kpis {
        total_root_sites: roots.len(),
        total_pages: pages.len(),
        scrapes_in_window: runs.len(),
        changes_in_window: changes.len(),
        success_rate: format!("{success_rate:.1}%"),
        avg_scrape_duration: format!("{avg_duration:.2}s"),
        avg_bytes_fetched: avg_bytes,
    };

    // Trends -----------------------------------------------------------

    let mut daily_scrapes: BTreeMap<String, usize> = BTreeMap::new();
    for run in &runs {
        *daily_scrapes
            .entry(run.started_at.date_naive().to_string())
            .or_default() += 1;
    }
    let mut daily_changes: BTreeMap<String, usize> = BTreeMap::new();
    for change in &changes {
        *daily_changes
            .entry(change.detected_at.date_naive().to_string())
            .or_default() += 1;
    }

    // Top-N ------------------------------------------------------------

    let mut changes_by_root: HashMap<&str, usize> = HashMap::new();
    let mut changes_by_page: HashMap<&str, usize> = HashMap::new();
    for change in &changes {
        *changes_by_root.entry(change.root_url.as_str()).or_default() += 1;
        *changes_by_page.entry(change.page_url.as_str()).or_default() += 1;
    }

    let top_root_sites = rank(&changes_by_root)
        .into_iter()
        .map(|(root_url, changes)| TopRoot {
            root_url: root_url.to_string(),
            changes,
        })
        .collect();
    let top_pages = rank(&changes_by_page)
        .into_iter()
        .map(|(page_url, changes)| TopPage {
            page_url: page_url.to_string(),
            changes,
        })
        .collect();

    // Recent activity --------------------------------------------------

    let recent_changes = recent
        .into_iter()
        .map(|entry| RecentChange {
            page_url: entry.url,
            date: entry.scraped_at,
            summary: entry.summary,
            changed: entry.changed,
        })
        .collect();

    // Per-root insights ------------------------------------------------

    let mut per_root_insights = BTreeMap::new();
    for (root, root_pages) in &roots {
        let scrapes = runs.iter().filter(|r| r.root_url == *root).count();
        let root_changes: Vec<_> = changes.iter().filter(|c| c.root_url == *root).collect();
        let change_rate = if scrapes == 0 {
            0.0
        } else {
            root_changes.len() as f64 / scrapes as f64 * 100.0
        };

        let mut page_counts: HashMap<&str, usize> = HashMap::new();
        for change in &root_changes {
            *page_counts.entry(change.page_url.as_str()).or_default() += 1;
        }
        let most_active_page = page_counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(url, _)| url.to_string());

        per_root_insights.insert(
            root.to_string(),
            RootInsight {
                total_pages: root_pages.len(),
                last_scraped: root_pages.iter().map(|p| p.last_scraped_at).max(),
                scrapes_in_window: scrapes,
                changes_in_window: root_changes.len(),
                change_rate: format!("{change_rate:.1}%"),
                most_active_page,
            },
        );
    }

    Ok(AnalyticsReport {
        window: window.as_str(),
        kpis,
        trends: Trends {
            daily_scrapes,
            daily_changes,
        },
        top_root_sites,
        top_pages,
        recent_changes,
        per_root_insights,
    })
}

/// Rank by count descending, ties broken by key ascending, truncated to the
/// top five. The tie order is arbitrary but stable.
fn rank<'a>(counts: &HashMap<&'a str, usize>) -> Vec<(&'a str, usize)> {
    let mut entries: Vec<_> = counts.iter().map(|(k, v)| (*k, *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    entries.truncate(TOP_N);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeEvent, HistoryEntry, Page, ScrapeRun};

    fn temp_repo() -> (tempfile::TempDir, MonitorRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = MonitorRepository::new(&dir.path().join("analytics.db")).unwrap();
        (dir, repo)
    }

    fn run(root: &str, page: &str, at: DateTime<Utc>, ok: bool, bytes: i64) -> ScrapeRun {
        ScrapeRun {
            root_url: root.into(),
            page_url: page.into(),
            started_at: at,
            finished_at: Some(at + Duration::seconds(2)),
            status: if ok { RunStatus::Success } else { RunStatus::Failed },
            bytes_fetched: bytes,
            change_detected: false,
        }
    }

    fn change(root: &str, page: &str, at: DateTime<Utc>) -> ChangeEvent {
        ChangeEvent {
            root_url: root.into(),
            page_url: page.into(),
            detected_at: at,
            change_type: ChangeEvent::CONTENT_UPDATE.into(),
            relevance_score: ChangeEvent::DEFAULT_RELEVANCE,
            diff_summary: "changed".into(),
        }
    }

    #[test]
    fn test_window_parse_defaults_to_day() {
        assert_eq!(TimeWindow::parse("24h"), TimeWindow::Day);
        assert_eq!(TimeWindow::parse("7d"), TimeWindow::Week);
        assert_eq!(TimeWindow::parse("14d"), TimeWindow::Fortnight);
        assert_eq!(TimeWindow::parse("1y"), TimeWindow::Day);
        assert_eq!(TimeWindow::parse(""), TimeWindow::Day);
    }

    #[test]
    fn test_empty_window_reports_zeroes_not_errors() {
        let (_dir, repo) = temp_repo();
        let report = build(&repo, TimeWindow::Day, Utc::now()).unwrap();

        assert_eq!(report.kpis.scrapes_in_window, 0);
        assert_eq!(report.kpis.changes_in_window, 0);
        assert_eq!(report.kpis.success_rate, "0.0%");
        assert_eq!(report.kpis.avg_scrape_duration, "0.00s");
        assert_eq!(report.kpis.avg_bytes_fetched, 0);
        assert!(report.top_root_sites.is_empty());
        assert!(report.recent_changes.is_empty());
        assert!(report.per_root_insights.is_empty());
    }

    #[test]
    fn test_kpis_and_window_filtering() {
        let (_dir, repo) = temp_repo();
        let now = Utc::now();
        let root = "https://ex.test/";

        repo.upsert_page(&Page {
            url: "https://ex.test/a".into(),
            root_url: Some(root.into()),
            content_digest: "d".into(),
            last_scraped_at: now,
            summary: None,
        })
        .unwrap();

        repo.append_run(&run(root, "https://ex.test/a", now - Duration::hours(1), true, 100))
            .unwrap();
        repo.append_run(&run(root, "https://ex.test/a", now - Duration::hours(2), false, 300))
            .unwrap();
        // Outside the 24h window.
        repo.append_run(&run(root, "https://ex.test/a", now - Duration::days(3), true, 900))
            .unwrap();

        let report = build(&repo, TimeWindow::Day, now).unwrap();
        assert_eq!(report.kpis.total_root_sites, 1);
        assert_eq!(report.kpis.total_pages, 1);
        assert_eq!(report.kpis.scrapes_in_window, 2);
        assert_eq!(report.kpis.success_rate, "50.0%");
        assert_eq!(report.kpis.avg_bytes_fetched, 200);
        assert_eq!(report.kpis.avg_scrape_duration, "2.00s");

        let week = build(&repo, TimeWindow::Week, now).unwrap();
        assert_eq!(week.kpis.scrapes_in_window, 3);
    }

    #[test]
    fn test_top_rankings_and_ties() {
        let (_dir, repo) = temp_repo();
        let now = Utc::now();

        for _ in 0..3 {
            repo.append_change_event(&change("https://b.test/", "https://b.test/x", now))
                .unwrap();
        }
        for _ in 0..3 {
            repo.append_change_event(&change("https://a.test/", "https://a.test/y", now))
                .unwrap();
        }
        repo.append_change_event(&change("https://c.test/", "https://c.test/z", now))
            .unwrap();

        let report = build(&repo, TimeWindow::Day, now).unwrap();
        let roots: Vec<_> = report
            .top_root_sites
            .iter()
            .map(|t| t.root_url.as_str())
            .collect();
        // Tie between a and b broken by URL ascending.
        assert_eq!(roots, vec!["https://a.test/", "https://b.test/", "https://c.test/"]);
        assert_eq!(report.top_root_sites[0].changes, 3);
    }

    #[test]
    fn test_per_root_insights() {
        let (_dir, repo) = temp_repo();
        let now = Utc::now();
        let root = "https://ex.test/";

        for path in ["a", "b"] {
            repo.upsert_page(&Page {
                url: format!("https://ex.test/{path}"),
                root_url: Some(root.into()),
                content_digest: "d".into(),
                last_scraped_at: now,
                summary: None,
            })
            .unwrap();
        }
        for _ in 0..4 {
            repo.append_run(&run(root, "https://ex.test/a", now - Duration::minutes(5), true, 10))
                .unwrap();
        }
        repo.append_change_event(&change(root, "https://ex.test/a", now - Duration::minutes(5)))
            .unwrap();
        repo.append_change_event(&change(root, "https://ex.test/a", now - Duration::minutes(4)))
            .unwrap();
        repo.append_change_event(&change(root, "https://ex.test/b", now - Duration::minutes(3)))
            .unwrap();

        let report = build(&repo, TimeWindow::Day, now).unwrap();
        let insight = &report.per_root_insights[root];
        assert_eq!(insight.total_pages, 2);
        assert_eq!(insight.scrapes_in_window, 4);
        assert_eq!(insight.changes_in_window, 3);
        assert_eq!(insight.change_rate, "75.0%");
        assert_eq!(insight.most_active_page.as_deref(), Some("https://ex.test/a"));
    }

    #[test]
    fn test_insight_with_no_runs_reports_zero_rate() {
        let (_dir, repo) = temp_repo();
        let now = Utc::now();
        repo.upsert_page(&Page {
            url: "https://quiet.test/".into(),
            root_url: Some("https://quiet.test/".into()),
            content_digest: "d".into(),
            last_scraped_at: now,
            summary: None,
        })
        .unwrap();

        let report = build(&repo, TimeWindow::Day, now).unwrap();
        let insight = &report.per_root_insights["https://quiet.test/"];
        assert_eq!(insight.change_rate, "0.0%");
        assert!(insight.most_active_page.is_none());
    }

    #[test]
    fn test_recent_changes_feed() {
        let (_dir, repo) = temp_repo();
        let now = Utc::now();

        for i in 0..3 {
            repo.append_history(&HistoryEntry {
                url: format!("https://ex.test/{i}"),
                content_digest: "d".into(),
                scraped_at: now - Duration::minutes(i),
                summary: Some("changed".into()),
                changed: i != 1,
                full_text: String::new(),
            })
            .unwrap();
        }

        let report = build(&repo, TimeWindow::Day, now).unwrap();
        assert_eq!(report.recent_changes.len(), 2);
        // Newest first, unchanged entries excluded.
        assert_eq!(report.recent_changes[0].page_url, "https://ex.test/0");
        assert_eq!(report.recent_changes[1].page_url, "https://ex.test/2");
    }
}
