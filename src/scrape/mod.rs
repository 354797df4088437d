//! Page fetching and content extraction.

pub mod extract;
pub mod fetcher;

pub use extract::{extract_links, extract_text, normalize_url, same_domain};
pub use fetcher::{FetchOptions, FetchedPage, HttpFetcher, PageFetcher};
