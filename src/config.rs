//! Configuration loading.
//!
//! Settings come from an optional TOML file; every field has a default so a
//! missing file yields a working configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default database file name in the working directory.
pub const DEFAULT_DB_FILE: &str = "sitewatch.db";

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub crawl: CrawlSettings,

    #[serde(default)]
    pub summarizer: SummarizerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            crawl: CrawlSettings::default(),
            summarizer: SummarizerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or defaults when no file is given or the
    /// given file does not exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let settings = toml::from_str(&raw)?;
        Ok(settings)
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_FILE)
}

/// Crawl walker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Maximum pages visited per crawl of one root.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Per-request fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Fixed delay between page fetches within one crawl, in milliseconds.
    /// Zero disables the delay.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_max_pages() -> usize {
    20
}
fn default_fetch_timeout_secs() -> u64 {
    15
}
fn default_request_delay_ms() -> u64 {
    250
}
fn default_user_agent() -> String {
    format!("sitewatch/{}", env!("CARGO_PKG_VERSION"))
}

/// Summarizer settings for the OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerSettings {
    /// Chat completions endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model used for page and site summaries.
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum characters of page text sent per request.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_content_chars() -> usize {
    10_000
}
