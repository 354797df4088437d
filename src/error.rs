//! Error types for the monitoring pipeline.

use thiserror::Error;

use crate::repository::RepositoryError;

/// Why a page fetch failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(reqwest::Error),

    #[error("no usable content")]
    EmptyBody,
}

impl FetchError {
    /// Classify a reqwest error, pulling timeouts out of the generic bucket.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(err)
        }
    }
}

/// Errors surfaced by the monitoring core.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("no schedule exists for {0}")]
    ScheduleNotFound(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
