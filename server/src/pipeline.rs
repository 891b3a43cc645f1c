use crate::query::ParsedQuery;
use crate::retrieval::{materialize, resolve_hit, RankingWeights, Retriever, ScoredHit, SearchHit};
use anyhow::Result;
use parking_lot::RwLock;
use sift_core::{Analyzer, Corpus, CorpusMeta, Fetcher, Store};
use sift_crawler::parser::norm;
use sift_crawler::{is_corpus_valid, CrawlError, CrawlOptions, Crawler};
use sift_indexer::build_indices;
use std::sync::Arc;
use url::Url;

/// A corpus with the ranking state derived from its indices.
pub struct Snapshot {
    pub corpus: Corpus,
    pub meta: CorpusMeta,
    pub retriever: Retriever,
}

/// Crawl, persist, index and retrieve behind one `search` call.
///
/// The last snapshot is cached in memory. Every search re-validates it
/// against the start page; a stale or mismatched snapshot is refreshed from
/// disk or by crawling again.
pub struct SearchEngine {
    store: Store,
    analyzer: Arc<Analyzer>,
    fetcher: Arc<dyn Fetcher>,
    crawl_options: CrawlOptions,
    weights: RankingWeights,
    cache: RwLock<Option<Arc<Snapshot>>>,
    refresh: tokio::sync::Mutex<()>,
}

fn canonical(start_url: &str) -> Result<String, CrawlError> {
    Url::parse(start_url)
        .map(|u| norm(&u))
        .map_err(|source| CrawlError::InvalidStartUrl { url: start_url.to_string(), source })
}

impl SearchEngine {
    pub fn new(
        store: Store,
        analyzer: Arc<Analyzer>,
        fetcher: Arc<dyn Fetcher>,
        crawl_options: CrawlOptions,
        weights: RankingWeights,
    ) -> Self {
        Self {
            store,
            analyzer,
            fetcher,
            crawl_options,
            weights,
            cache: RwLock::new(None),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub async fn search(
        &self,
        query: &str,
        start_url: &str,
        max_pages: usize,
        max_results: usize,
    ) -> Result<Vec<ScoredHit>> {
        let parsed = ParsedQuery::parse(query, &self.analyzer);
        if parsed.is_empty() {
            return Ok(Vec::new());
        }
        let snapshot = self.snapshot(start_url, max_pages).await?;
        let ranked = snapshot.retriever.rank(&parsed, max_results);
        tracing::debug!(query, hits = ranked.len(), "query ranked");
        Ok(materialize(
            ranked,
            &snapshot.corpus,
            self.fetcher.as_ref(),
            &self.analyzer,
            self.crawl_options.fetch_timeout,
        )
        .await)
    }

    /// Describes one URL: from the cached corpus when known, else by a
    /// one-off fetch.
    pub async fn lookup(&self, url: &str) -> SearchHit {
        let cached = self.cache.read().clone();
        resolve_hit(
            url,
            cached.as_ref().map(|s| &s.corpus),
            self.fetcher.as_ref(),
            &self.analyzer,
            self.crawl_options.fetch_timeout,
        )
        .await
    }

    /// Returns a fresh snapshot for `start_url`, refreshing it if needed.
    pub async fn snapshot(&self, start_url: &str, max_pages: usize) -> Result<Arc<Snapshot>> {
        let start_url = canonical(start_url)?;
        let _refreshing = self.refresh.lock().await;

        let cached = self.cache.read().clone();
        if let Some(snapshot) = cached {
            if self.reusable(&start_url, max_pages, &snapshot.corpus, &snapshot.meta).await {
                return Ok(snapshot);
            }
        }
        let snapshot = Arc::new(self.rebuild(&start_url, max_pages).await?);
        *self.cache.write() = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    async fn reusable(&self, start_url: &str, max_pages: usize, corpus: &Corpus, meta: &CorpusMeta) -> bool {
        meta.start_url == start_url
            && meta.max_pages == max_pages
            && is_corpus_valid(
                self.fetcher.as_ref(),
                start_url,
                corpus.start_page(),
                meta.age(),
                self.crawl_options.fetch_timeout,
            )
            .await
    }

    async fn rebuild(&self, start_url: &str, max_pages: usize) -> Result<Snapshot> {
        let prior = self.store.load_corpus().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read stored corpus, treating as cold start");
            None
        });
        let fresh = match &prior {
            Some((corpus, meta)) => self.reusable(start_url, max_pages, corpus, meta).await,
            None => false,
        };
        let (corpus, meta) = match prior {
            Some(stored) if fresh => {
                tracing::info!(start_url, pages = stored.0.len(), "serving stored corpus");
                stored
            }
            prior => {
                let reuse = prior.as_ref().map(|(c, _)| c).filter(|c| c.start_url() == start_url);
                let crawler = Crawler::new(
                    Arc::clone(&self.fetcher),
                    Arc::clone(&self.analyzer),
                    self.crawl_options.clone(),
                );
                let corpus = crawler.crawl(start_url, max_pages, reuse).await?;
                let meta = self.store.save_corpus(&corpus, max_pages)?;
                (corpus, meta)
            }
        };

        let stored = self.store.load_indices().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read stored indices, rebuilding");
            None
        });
        let (body, title) = match stored {
            Some((body, title, index_meta)) if index_meta.corpus_created_at == meta.created_at => (body, title),
            _ => {
                let (body, title) = build_indices(&corpus, &self.analyzer);
                self.store.save_indices(&body, &title, &meta)?;
                (body, title)
            }
        };
        let retriever = Retriever::new(&body, &title, self.weights.clone());
        Ok(Snapshot { corpus, meta, retriever })
    }
}
