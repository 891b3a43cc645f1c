use sift_core::{Fetcher, Page};
use std::time::Duration;
use time::OffsetDateTime;

/// Persisted corpora older than this are always recrawled.
pub const MAX_CORPUS_AGE: Duration = Duration::from_secs(86_400);

/// Decides whether a persisted corpus can be served without recrawling.
///
/// The start page is probed for its current modification time; a missing
/// header counts as "modified now". A failed probe is optimistic and keeps
/// the corpus.
pub async fn is_corpus_valid(
    fetcher: &dyn Fetcher,
    start_url: &str,
    start_page: &Page,
    corpus_age: Duration,
    timeout: Duration,
) -> bool {
    if start_page.url != start_url {
        tracing::debug!(start_url, stored = %start_page.url, "corpus was crawled from another start page");
        return false;
    }
    let current = match fetcher.probe(start_url, timeout).await {
        Ok(probe) => probe.modified_at.unwrap_or_else(OffsetDateTime::now_utc),
        Err(e) => {
            tracing::warn!(start_url, error = %e, "freshness probe failed, keeping corpus");
            return true;
        }
    };
    let valid = current <= start_page.last_modified && corpus_age < MAX_CORPUS_AGE;
    tracing::debug!(start_url, valid, age_s = corpus_age.as_secs(), "corpus freshness checked");
    valid
}
