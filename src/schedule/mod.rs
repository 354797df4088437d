//! Recurring-crawl schedule registry.
//!
//! One clock task ticks every second, collects jobs whose next-due time has
//! elapsed, advances their cadence, and dispatches each firing onto its own
//! task. Registration and removal share the jobs lock with the clock, so
//! replacing a root's job atomically cancels the old cadence: there is no
//! window in which both can fire.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// A registered job: invoked once per firing, runs on its own task.
pub type JobFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Clock tick granularity.
const TICK: Duration = Duration::from_secs(1);

struct JobSlot {
    every: Duration,
    next_due: Instant,
    job: JobFn,
}

/// Registry mapping each root URL to at most one recurring job.
pub struct ScheduleRegistry {
    jobs: Arc<Mutex<HashMap<String, JobSlot>>>,
    clock: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ScheduleRegistry {
    /// Create the registry and start its clock. Must be called from within
    /// a tokio runtime.
    pub fn new() -> Self {
        let jobs: Arc<Mutex<HashMap<String, JobSlot>>> = Arc::new(Mutex::new(HashMap::new()));
        let clock_jobs = Arc::clone(&jobs);

        let handle = tokio::spawn(async move {
            let mut tick = interval(TICK);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let due: Vec<JobFn> = {
                    let mut jobs = clock_jobs.lock().await;
                    let now = Instant::now();
                    jobs.values_mut()
                        .filter(|slot| slot.next_due <= now)
                        .map(|slot| {
                            slot.next_due = now + slot.every;
                            Arc::clone(&slot.job)
                        })
                        .collect()
                };
                // Fire outside the lock; a slow job must never stall the
                // clock or other roots.
                for job in due {
                    tokio::spawn(job());
                }
            }
        });

        Self {
            jobs,
            clock: std::sync::Mutex::new(Some(handle)),
        }
    }

    /// Register or replace the job for a root. The first firing happens one
    /// full interval after registration.
    pub async fn upsert(&self, root_url: &str, every: Duration, job: JobFn) {
        info!(root = %root_url, ?every, "scheduling recurring crawl");
        let mut jobs = self.jobs.lock().await;
        jobs.insert(
            root_url.to_string(),
            JobSlot {
                every,
                next_due: Instant::now() + every,
                job,
            },
        );
    }

    /// Cancel the job for a root. Idempotent; returns whether one existed.
    pub async fn remove(&self, root_url: &str) -> bool {
        debug!(root = %root_url, "removing schedule");
        self.jobs.lock().await.remove(root_url).is_some()
    }

    /// Whether a root currently has a registered job.
    pub async fn contains(&self, root_url: &str) -> bool {
        self.jobs.lock().await.contains_key(root_url)
    }

    /// Number of registered jobs.
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop the clock. Jobs already dispatched keep running; only future
    /// firings stop.
    pub fn stop(&self) {
        if let Some(handle) = self.clock.lock().expect("clock lock poisoned").take() {
            handle.abort();
        }
    }
}

impl Drop for ScheduleRegistry {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(counter: Arc<AtomicUsize>) -> JobFn {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_fires_on_cadence() {
        let registry = ScheduleRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry
            .upsert(
                "https://ex.test/",
                Duration::from_secs(5),
                counting_job(Arc::clone(&counter)),
            )
            .await;

        tokio::time::sleep(Duration::from_secs(12)).await;
        tokio::task::yield_now().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        registry.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reregistering_replaces_cadence() {
        let registry = ScheduleRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let root = "https://ex.test/";

        registry
            .upsert(root, Duration::from_secs(5), counting_job(Arc::clone(&counter)))
            .await;
        registry
            .upsert(root, Duration::from_secs(60), counting_job(Arc::clone(&counter)))
            .await;
        assert_eq!(registry.len().await, 1);

        // Old 5s cadence must be gone.
        tokio::time::sleep(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(40)).await;
        tokio::task::yield_now().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        registry.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_job_stops_firing() {
        let registry = ScheduleRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let root = "https://ex.test/";

        registry
            .upsert(root, Duration::from_secs(5), counting_job(Arc::clone(&counter)))
            .await;
        assert!(registry.remove(root).await);
        assert!(!registry.remove(root).await);
        assert!(!registry.contains(root).await);

        tokio::time::sleep(Duration::from_secs(20)).await;
        tokio::task::yield_now().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        registry.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_roots_fire_independently() {
        let registry = ScheduleRegistry::new();
        let fast = Arc::new(AtomicUsize::new(0));
        let slow = Arc::new(AtomicUsize::new(0));

        registry
            .upsert("https://fast.test/", Duration::from_secs(2), counting_job(Arc::clone(&fast)))
            .await;
        registry
            .upsert("https://slow.test/", Duration::from_secs(10), counting_job(Arc::clone(&slow)))
            .await;

        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert!(fast.load(Ordering::SeqCst) >= 4);
        assert_eq!(slow.load(Ordering::SeqCst), 1);
        registry.stop();
    }
}
