//! Recurring-crawl schedule model.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Unit for a schedule's recurrence interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl IntervalUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalUnit::Seconds => "seconds",
            IntervalUnit::Minutes => "minutes",
            IntervalUnit::Hours => "hours",
            IntervalUnit::Days => "days",
        }
    }

    /// Parse a stored unit, defaulting to minutes for unknown values.
    pub fn parse(s: &str) -> Self {
        match s {
            "seconds" => IntervalUnit::Seconds,
            "hours" => IntervalUnit::Hours,
            "days" => IntervalUnit::Days,
            _ => IntervalUnit::Minutes,
        }
    }

    /// Seconds in one unit.
    fn seconds(&self) -> u64 {
        match self {
            IntervalUnit::Seconds => 1,
            IntervalUnit::Minutes => 60,
            IntervalUnit::Hours => 3600,
            IntervalUnit::Days => 86400,
        }
    }
}

/// Recurring-crawl policy for one root URL. At most one per root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub root_url: String,
    pub interval_value: u32,
    pub interval_unit: IntervalUnit,
    pub active: bool,
}

impl Schedule {
    /// The recurrence interval as a wall-clock duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_value) * self.interval_unit.seconds())
    }
}
