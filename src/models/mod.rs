//! Data models for sitewatch.

mod history;
mod page;
mod schedule;

pub use history::{ChangeEvent, HistoryEntry, RunStatus, ScrapeRun};
pub use page::{Page, SiteSummary};
pub use schedule::{IntervalUnit, Schedule};
