//! Shared model and plumbing for the sift search engine: pages and the crawl
//! corpus, inverted indices, text analysis, the fetch contract and the
//! on-disk stores used by the crawler, indexer and server.

pub mod codec;
pub mod fetch;
pub mod index;
pub mod page;
pub mod persist;
pub mod report;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod tokenizer;

pub use fetch::{FetchError, FetchResponse, Fetcher, ProbeResponse};
pub use index::{InvertedIndex, Posting};
pub use page::{Corpus, Page, UNTITLED};
pub use persist::{CorpusMeta, DataPaths, IndexMeta, Store, StoreError};
pub use tokenizer::{Analyzer, Stopwords};
#[cfg(any(test, feature = "test-util"))]
pub use testing::MemoryFetcher;
