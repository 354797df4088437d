//! CLI commands implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::analytics::TimeWindow;
use crate::config::Settings;
use crate::crawl::Crawler;
use crate::llm::OpenAiSummarizer;
use crate::models::IntervalUnit;
use crate::repository::MonitorRepository;
use crate::scrape::HttpFetcher;
use crate::services::Monitor;

#[derive(Parser)]
#[command(name = "sitewatch")]
#[command(about = "Website change monitoring and analytics")]
#[command(version)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a root URL and keep re-crawling it on a schedule
    Monitor {
        /// Root URL to monitor
        url: String,
        /// Recurrence interval value
        #[arg(long, default_value = "60")]
        every: u32,
        /// Recurrence interval unit
        #[arg(long, value_enum, default_value = "minutes")]
        unit: IntervalUnit,
        /// Crawl once and exit instead of scheduling
        #[arg(long)]
        once: bool,
        /// API key for AI summaries (falls back to a local preview)
        #[arg(long, env = "OPENAI_API_KEY")]
        api_key: Option<String>,
    },

    /// Run a single crawl of a root URL
    Trigger {
        url: String,
        #[arg(long, env = "OPENAI_API_KEY")]
        api_key: Option<String>,
    },

    /// Pause the schedule for a root URL
    Pause { root_url: String },

    /// Resume the schedule for a root URL
    Resume { root_url: String },

    /// Delete a root and everything it owns
    Delete { root_url: String },

    /// Show the analytics dashboard data as JSON
    Analytics {
        /// Time window: 24h, 7d, or 14d
        #[arg(long, default_value = "24h")]
        window: String,
    },

    /// Show scrape history for a URL
    History {
        url: String,
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// List monitored pages grouped by root
    Pages,

    /// List persisted schedules
    Schedules,
}

/// Build the service stack from settings.
fn build_monitor(settings: &Settings) -> anyhow::Result<Monitor> {
    let repo = Arc::new(MonitorRepository::new(&settings.db_path)?);
    let fetcher = Arc::new(HttpFetcher::new(
        Duration::from_secs(settings.crawl.fetch_timeout_secs),
        &settings.crawl.user_agent,
    ));
    let summarizer = Arc::new(OpenAiSummarizer::new(settings.summarizer.clone()));
    let crawler = Arc::new(Crawler::new(
        Arc::clone(&repo),
        fetcher,
        summarizer,
        settings.crawl.clone(),
    ));
    Ok(Monitor::new(repo, crawler))
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let monitor = build_monitor(&settings)?;

    match cli.command {
        Commands::Monitor {
            url,
            every,
            unit,
            once,
            api_key,
        } => {
            if once {
                let outcome = monitor.trigger_once(&url, api_key.as_deref()).await?;
                println!(
                    "Crawled {} pages ({} changes, {} failures)",
                    outcome.pages_visited, outcome.changes_detected, outcome.failures
                );
                return Ok(());
            }

            // Resume persisted schedules first; installing this root last
            // keeps its credential-carrying job in place.
            monitor.reload_schedules().await?;
            monitor
                .start_monitoring(&url, api_key, every, unit)
                .await?;
            println!(
                "Monitoring {url} every {every} {}. Press Ctrl+C to stop.",
                unit.as_str()
            );
            tokio::signal::ctrl_c().await?;
            monitor.stop();
        }

        Commands::Trigger { url, api_key } => {
            let outcome = monitor.trigger_once(&url, api_key.as_deref()).await?;
            println!(
                "Crawled {} pages ({} changes, {} failures)",
                outcome.pages_visited, outcome.changes_detected, outcome.failures
            );
        }

        Commands::Pause { root_url } => {
            monitor.toggle_schedule(&root_url, false).await?;
            println!("Schedule paused for {root_url}");
        }

        Commands::Resume { root_url } => {
            monitor.toggle_schedule(&root_url, true).await?;
            println!("Schedule resumed for {root_url}");
        }

        Commands::Delete { root_url } => {
            let deleted = monitor.delete_root(&root_url).await?;
            println!("Deleted {deleted} pages under {root_url}");
        }

        Commands::Analytics { window } => {
            let report = monitor.analytics(TimeWindow::parse(&window))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::History { url, limit } => {
            let entries = monitor.history(&url, limit)?;
            if entries.is_empty() {
                println!("No history for {url}");
            }
            for entry in entries {
                println!(
                    "{}  changed={}  {}",
                    entry.scraped_at.to_rfc3339(),
                    entry.changed,
                    entry.summary.as_deref().unwrap_or("-")
                );
            }
        }

        Commands::Pages => {
            for group in monitor.pages_grouped()? {
                println!("{}", group.root_url);
                if let Some(summary) = &group.site_summary {
                    println!("  summary: {}", summary.lines().next().unwrap_or_default());
                }
                if let Some(schedule) = &group.schedule {
                    println!(
                        "  schedule: every {} {} ({})",
                        schedule.interval_value,
                        schedule.interval_unit.as_str(),
                        if schedule.active { "active" } else { "paused" }
                    );
                }
                for page in &group.pages {
                    println!("  {}  last scraped {}", page.url, page.last_scraped_at.to_rfc3339());
                }
            }
        }

        Commands::Schedules => {
            for schedule in monitor.schedules()? {
                println!(
                    "{}  every {} {}  {}",
                    schedule.root_url,
                    schedule.interval_value,
                    schedule.interval_unit.as_str(),
                    if schedule.active { "active" } else { "paused" }
                );
            }
        }
    }

    Ok(())
}
