//! Bounded breadth-first crawl of one site.
//!
//! Each crawl walks pages reachable from a root URL within the same domain,
//! one page at a time. Per-page failures are recorded and skipped; only a
//! repository failure aborts the crawl. Crawls of different roots run as
//! independent tasks and never coordinate.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CrawlSettings;
use crate::error::{MonitorError, Result};
use crate::fingerprint;
use crate::llm::Summarizer;
use crate::models::{ChangeEvent, HistoryEntry, Page, RunStatus, ScrapeRun};
use crate::repository::MonitorRepository;
use crate::scrape::{extract_links, extract_text, normalize_url, FetchOptions, PageFetcher};

/// What a finished crawl did.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub root_url: String,
    pub pages_visited: usize,
    pub changes_detected: usize,
    pub failures: usize,
}

/// Crawl walker over a fetcher, extractor, detector, and repository.
#[derive(Clone)]
pub struct Crawler {
    repo: Arc<MonitorRepository>,
    fetcher: Arc<dyn PageFetcher>,
    summarizer: Arc<dyn Summarizer>,
    settings: CrawlSettings,
}

impl Crawler {
    pub fn new(
        repo: Arc<MonitorRepository>,
        fetcher: Arc<dyn PageFetcher>,
        summarizer: Arc<dyn Summarizer>,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            repo,
            fetcher,
            summarizer,
            settings,
        }
    }

    /// Crawl every same-domain page reachable from `root_url`, up to the
    /// configured page cap, then write the site-level summary.
    pub async fn crawl_site(
        &self,
        root_url: &str,
        credential: Option<&str>,
    ) -> Result<CrawlOutcome> {
        let root = Url::parse(root_url).map_err(|source| MonitorError::InvalidUrl {
            url: root_url.to_string(),
            source,
        })?;
        let root_key = normalize_url(&root);
        info!(root = %root_key, "starting crawl");

        let mut frontier = VecDeque::new();
        let mut queued: HashSet<String> = HashSet::new();
        let mut visited: HashSet<String> = HashSet::new();
        frontier.push_back(root_key.clone());
        queued.insert(root_key.clone());

        let mut outcome = CrawlOutcome {
            root_url: root_key.clone(),
            pages_visited: 0,
            changes_detected: 0,
            failures: 0,
        };

        while let Some(url) = frontier.pop_front() {
            if visited.len() >= self.settings.max_pages {
                debug!(root = %root_key, cap = self.settings.max_pages, "page cap reached");
                break;
            }
            if !visited.insert(url.clone()) {
                continue;
            }
            outcome.pages_visited += 1;

            match self
                .process_page(&root_key, &url, credential)
                .await?
            {
                PageResult::Fetched { changed, links } => {
                    if changed {
                        outcome.changes_detected += 1;
                    }
                    for link in links {
                        if !visited.contains(&link) && queued.insert(link.clone()) {
                            frontier.push_back(link);
                        }
                    }
                }
                PageResult::Failed => outcome.failures += 1,
            }

            if self.settings.request_delay_ms > 0 && !frontier.is_empty() {
                tokio::time::sleep(Duration::from_millis(self.settings.request_delay_ms)).await;
            }
        }

        self.write_site_summary(&root_key, credential).await?;
        info!(
            root = %root_key,
            pages = outcome.pages_visited,
            changes = outcome.changes_detected,
            failures = outcome.failures,
            "crawl finished"
        );
        Ok(outcome)
    }

    /// Fetch and record one page. Fetch or extraction trouble is logged as a
    /// failed run and isolated to this page; repository errors propagate.
    async fn process_page(
        &self,
        root_key: &str,
        url: &str,
        credential: Option<&str>,
    ) -> Result<PageResult> {
        debug!(%url, "processing page");
        let started_at = Utc::now();
        let options = FetchOptions::default();

        let page = match self.fetcher.fetch(url, options).await {
            Ok(page) => page,
            Err(err) => {
                warn!(%url, error = %err, "fetch failed");
                self.repo.append_run(&ScrapeRun {
                    root_url: root_key.to_string(),
                    page_url: url.to_string(),
                    started_at,
                    finished_at: Some(Utc::now()),
                    status: RunStatus::Failed,
                    bytes_fetched: 0,
                    change_detected: false,
                })?;
                return Ok(PageResult::Failed);
            }
        };

        let text = extract_text(&page.content, &page.content_type);
        let bytes_fetched = page.content.len() as i64;
        let digest = fingerprint::fingerprint(&text);

        // Changed iff a prior digest exists and differs. First observation
        // of a URL is a new page, not a change.
        let changed = match self.repo.get_page(url)? {
            Some(prev) => fingerprint::has_changed(&prev.content_digest, &digest),
            None => false,
        };

        let summary = match self.summarizer.summarize_page(&text, credential).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(%url, error = %err, "summarization failed");
                format!("Summary unavailable: {err}")
            }
        };

        let now = Utc::now();
        self.repo.upsert_page(&Page {
            url: url.to_string(),
            root_url: Some(root_key.to_string()),
            content_digest: digest.clone(),
            last_scraped_at: now,
            summary: Some(summary.clone()),
        })?;
        self.repo.append_history(&HistoryEntry {
            url: url.to_string(),
            content_digest: digest,
            scraped_at: now,
            summary: Some(summary.clone()),
            changed,
            full_text: text,
        })?;
        self.repo.append_run(&ScrapeRun {
            root_url: root_key.to_string(),
            page_url: url.to_string(),
            started_at,
            finished_at: Some(now),
            status: RunStatus::Success,
            bytes_fetched,
            change_detected: changed,
        })?;
        if changed {
            info!(%url, "change detected");
            self.repo.append_change_event(&ChangeEvent {
                root_url: root_key.to_string(),
                page_url: url.to_string(),
                detected_at: now,
                change_type: ChangeEvent::CONTENT_UPDATE.to_string(),
                relevance_score: ChangeEvent::DEFAULT_RELEVANCE,
                diff_summary: summary,
            })?;
        }

        let base = match Url::parse(url) {
            Ok(base) => base,
            Err(_) => return Ok(PageResult::Fetched { changed, links: Vec::new() }),
        };
        let links = extract_links(&page.content, &page.content_type, &base);
        Ok(PageResult::Fetched { changed, links })
    }

    /// Synthesize one site-level summary from the stored page summaries.
    /// Summarizer trouble degrades to a placeholder; the crawl already
    /// succeeded by the time this runs.
    async fn write_site_summary(&self, root_key: &str, credential: Option<&str>) -> Result<()> {
        let summaries = self.repo.page_summaries_for_root(root_key)?;
        let site_summary = match self.summarizer.summarize_site(&summaries, credential).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(root = %root_key, error = %err, "site summarization failed");
                format!("Site summary unavailable: {err}")
            }
        };
        self.repo.upsert_site_summary(root_key, &site_summary)?;
        Ok(())
    }
}

enum PageResult {
    Fetched { changed: bool, links: Vec<String> },
    Failed,
}
