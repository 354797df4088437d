//! sitewatch - website change monitoring and analytics.
//!
//! A monitoring pipeline: a bounded BFS crawl walker, a content-fingerprint
//! change detector, a per-site recurring scheduler, and a windowed analytics
//! aggregator over the resulting event history.

pub mod analytics;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod error;
pub mod fingerprint;
pub mod llm;
pub mod models;
pub mod repository;
pub mod schedule;
pub mod scrape;
pub mod services;
