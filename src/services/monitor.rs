//! Monitor service: the operations the core exposes to callers.
//!
//! Owns the repository, the crawl walker, and the schedule registry. Crawl
//! credentials travel inside each job's closure; there is no process-global
//! credential state.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::error;

use crate::analytics::{self, AnalyticsReport, TimeWindow};
use crate::crawl::{CrawlOutcome, Crawler};
use crate::error::{MonitorError, Result};
use crate::models::{HistoryEntry, IntervalUnit, Page, Schedule};
use crate::repository::MonitorRepository;
use crate::schedule::{JobFn, ScheduleRegistry};

/// One monitored root with its pages, site summary, and schedule.
#[derive(Debug, Clone, Serialize)]
pub struct RootGroup {
    pub root_url: String,
    pub site_summary: Option<String>,
    pub schedule: Option<Schedule>,
    pub pages: Vec<Page>,
}

/// Facade over the monitoring pipeline.
pub struct Monitor {
    repo: Arc<MonitorRepository>,
    crawler: Arc<Crawler>,
    registry: ScheduleRegistry,
}

impl Monitor {
    /// Build the service. Must be called from within a tokio runtime; the
    /// schedule registry starts its clock immediately.
    pub fn new(repo: Arc<MonitorRepository>, crawler: Arc<Crawler>) -> Self {
        Self {
            repo,
            crawler,
            registry: ScheduleRegistry::new(),
        }
    }

    fn crawl_job(&self, root_url: &str, credential: Option<String>) -> JobFn {
        let crawler = Arc::clone(&self.crawler);
        let root = root_url.to_string();
        Arc::new(move || {
            let crawler = Arc::clone(&crawler);
            let root = root.clone();
            let credential = credential.clone();
            Box::pin(async move {
                if let Err(err) = crawler.crawl_site(&root, credential.as_deref()).await {
                    error!(root = %root, error = %err, "scheduled crawl failed");
                }
            })
        })
    }

    /// Start monitoring a root: kick off an immediate crawl and install a
    /// recurring schedule at the given cadence.
    pub async fn start_monitoring(
        &self,
        root_url: &str,
        credential: Option<String>,
        interval_value: u32,
        interval_unit: IntervalUnit,
    ) -> Result<()> {
        let schedule = Schedule {
            root_url: root_url.to_string(),
            interval_value,
            interval_unit,
            active: true,
        };
        self.repo.upsert_schedule(&schedule)?;

        let job = self.crawl_job(root_url, credential);
        self.registry
            .upsert(root_url, schedule.interval(), Arc::clone(&job))
            .await;

        // Initial crawl runs right away on its own task, same as a firing.
        tokio::spawn(job());
        Ok(())
    }

    /// Run one crawl of a root to completion.
    pub async fn trigger_once(
        &self,
        root_url: &str,
        credential: Option<&str>,
    ) -> Result<CrawlOutcome> {
        self.crawler.crawl_site(root_url, credential).await
    }

    /// Activate or pause an existing schedule. Fails without side effects
    /// when no schedule exists for the root.
    pub async fn toggle_schedule(&self, root_url: &str, active: bool) -> Result<Schedule> {
        let Some(mut schedule) = self.repo.get_schedule(root_url)? else {
            return Err(MonitorError::ScheduleNotFound(root_url.to_string()));
        };
        schedule.active = active;
        self.repo.upsert_schedule(&schedule)?;

        if active {
            let job = self.crawl_job(root_url, None);
            self.registry
                .upsert(root_url, schedule.interval(), job)
                .await;
        } else {
            self.registry.remove(root_url).await;
        }
        Ok(schedule)
    }

    /// Delete a root and everything it owns. Returns the number of pages
    /// removed. In-flight crawls of this root are not aborted; their
    /// remaining writes recreate nothing beyond page rows.
    pub async fn delete_root(&self, root_url: &str) -> Result<usize> {
        self.registry.remove(root_url).await;
        let deleted = self.repo.delete_root(root_url)?;
        Ok(deleted)
    }

    /// Recreate in-memory timers from persisted schedules. Active schedules
    /// get a timer; inactive ones are guaranteed not to have one. Returns
    /// how many timers were installed.
    pub async fn reload_schedules(&self) -> Result<usize> {
        let mut installed = 0;
        for schedule in self.repo.list_schedules()? {
            if schedule.active {
                let job = self.crawl_job(&schedule.root_url, None);
                self.registry
                    .upsert(&schedule.root_url, schedule.interval(), job)
                    .await;
                installed += 1;
            } else {
                self.registry.remove(&schedule.root_url).await;
            }
        }
        Ok(installed)
    }

    /// Windowed analytics report.
    pub fn analytics(&self, window: TimeWindow) -> Result<AnalyticsReport> {
        Ok(analytics::build(&self.repo, window, Utc::now())?)
    }

    /// Recent snapshots for one URL, newest first.
    pub fn history(&self, url: &str, limit: u32) -> Result<Vec<HistoryEntry>> {
        Ok(self.repo.history_for_url(url, limit)?)
    }

    /// All persisted schedules.
    pub fn schedules(&self) -> Result<Vec<Schedule>> {
        Ok(self.repo.list_schedules()?)
    }

    /// All pages grouped by root, with each root's site summary and
    /// schedule attached. Pages without a root group under "uncategorized".
    pub fn pages_grouped(&self) -> Result<Vec<RootGroup>> {
        let mut groups: BTreeMap<String, Vec<Page>> = BTreeMap::new();
        for page in self.repo.list_pages()? {
            let key = page
                .root_url
                .clone()
                .unwrap_or_else(|| "uncategorized".to_string());
            groups.entry(key).or_default().push(page);
        }

        let mut result = Vec::with_capacity(groups.len());
        for (root_url, pages) in groups {
            let site_summary = self
                .repo
                .get_site_summary(&root_url)?
                .map(|summary| summary.summary);
            let schedule = self.repo.get_schedule(&root_url)?;
            result.push(RootGroup {
                root_url,
                site_summary,
                schedule,
                pages,
            });
        }
        Ok(result)
    }

    /// Stop future schedule firings. Already-dispatched crawls finish.
    pub fn stop(&self) {
        self.registry.stop();
    }
}
