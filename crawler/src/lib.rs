//! Incremental breadth-first crawler.
//!
//! [`Crawler::crawl`] walks a site from a start URL and returns a
//! [`sift_core::Corpus`] with parent and child links kept consistent. A prior
//! corpus turns the walk incremental: known pages are fetched conditionally
//! and reused when the server answers 304. [`is_corpus_valid`] decides
//! whether a persisted corpus may be served as-is.

mod engine;
mod fetcher;
mod freshness;
mod frontier;
pub mod parser;

pub use engine::{download, fetch_page, CrawlError, CrawlOptions, Crawler, Download, PageContent};
pub use fetcher::{HttpFetcher, DEFAULT_USER_AGENT, MAX_BODY_BYTES};
pub use freshness::{is_corpus_valid, MAX_CORPUS_AGE};
