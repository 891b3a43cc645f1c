use crate::frontier::Frontier;
use crate::parser::{norm, parse_html};
use sift_core::fetch::DEFAULT_FETCH_TIMEOUT;
use sift_core::{Analyzer, Corpus, FetchError, Fetcher, Page, UNTITLED};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::task::JoinSet;
use url::Url;

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Fetches in flight at once.
    pub concurrency: usize,
    pub fetch_timeout: Duration,
    /// Wall-clock budget for the whole crawl. In-flight fetches are abandoned
    /// once it runs out.
    pub deadline: Option<Duration>,
    /// Only follow links on the start URL's host.
    pub same_host_only: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self { concurrency: 4, fetch_timeout: DEFAULT_FETCH_TIMEOUT, deadline: None, same_host_only: false }
    }
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid start url {url}: {source}")]
    InvalidStartUrl { url: String, source: url::ParseError },

    #[error("start page {url} could not be fetched")]
    StartPageMissing { url: String },
}

/// What a worker learned about one URL, before any graph update.
#[derive(Debug)]
pub struct PageContent {
    pub modified_at: Option<OffsetDateTime>,
    pub size_bytes: u64,
    pub title: Option<String>,
    pub body_keywords: BTreeMap<String, u32>,
    pub links: Vec<String>,
}

impl PageContent {
    fn into_page(
        self,
        url: &str,
        parent_links: BTreeSet<String>,
        child_links: BTreeSet<String>,
        last_modified: OffsetDateTime,
    ) -> Page {
        Page {
            url: url.to_string(),
            title: self.title.unwrap_or_else(|| UNTITLED.to_string()),
            last_modified,
            size_bytes: self.size_bytes,
            body_keywords: self.body_keywords,
            parent_links,
            child_links,
        }
    }
}

#[derive(Debug)]
pub enum Download {
    NotModified,
    Page(PageContent),
}

/// Fetch, parse and tokenize one URL.
pub async fn download(
    fetcher: &dyn Fetcher,
    analyzer: &Analyzer,
    url: &str,
    if_modified_since: Option<OffsetDateTime>,
    timeout: Duration,
) -> Result<Download, FetchError> {
    let base = Url::parse(url)
        .map_err(|e| FetchError::Unsupported { url: url.to_string(), reason: e.to_string() })?;
    let resp = fetcher.fetch(url, if_modified_since, timeout).await?;
    if resp.not_modified {
        return Ok(Download::NotModified);
    }
    let parsed = parse_html(&resp.body, &base);
    Ok(Download::Page(PageContent {
        modified_at: resp.modified_at,
        size_bytes: resp.body.len() as u64,
        title: parsed.title,
        body_keywords: analyzer.body_keywords(&parsed.body_text),
        links: parsed.links,
    }))
}

/// One-off fetch of a page outside any crawl. Nothing is persisted and the
/// page has no parents.
pub async fn fetch_page(
    fetcher: &dyn Fetcher,
    analyzer: &Analyzer,
    url: &str,
    timeout: Duration,
) -> Result<Page, FetchError> {
    match download(fetcher, analyzer, url, None, timeout).await? {
        Download::Page(content) => {
            let modified = content.modified_at.unwrap_or_else(OffsetDateTime::now_utc);
            let children = content.links.iter().cloned().collect();
            Ok(content.into_page(url, BTreeSet::new(), children, modified))
        }
        Download::NotModified => Err(FetchError::Unsupported {
            url: url.to_string(),
            reason: "not modified without a conditional request".into(),
        }),
    }
}

struct Fetched {
    url: String,
    outcome: Result<Download, FetchError>,
}

/// Graph state owned by the crawl loop. Workers never see it, so every
/// page's update is applied in one piece.
struct CrawlState<'a> {
    start_url: String,
    host: Option<String>,
    prior: Option<&'a Corpus>,
    visited: BTreeMap<String, Page>,
    frontier: Frontier,
}

impl CrawlState<'_> {
    fn known_date(&self, url: &str) -> Option<OffsetDateTime> {
        self.visited
            .get(url)
            .or_else(|| self.prior.and_then(|c| c.get(url)))
            .map(|p| p.last_modified)
    }

    fn follows(&self, link: &str) -> bool {
        match &self.host {
            None => true,
            Some(host) => Url::parse(link).ok().map_or(false, |u| u.host_str() == Some(host.as_str())),
        }
    }

    /// Drops `url` as a parent of every child it no longer links to, and
    /// collects children left without parents (never the start page).
    fn unlink_removed(&mut self, url: &str, before: &BTreeSet<String>, after: &BTreeSet<String>) {
        for gone in before.difference(after) {
            if gone == &self.start_url {
                if let Some(node) = self.visited.get_mut(gone) {
                    node.parent_links.remove(url);
                }
                self.frontier.remove_parent(gone, url);
                continue;
            }
            let orphaned = match self.visited.get_mut(gone) {
                Some(node) => {
                    node.parent_links.remove(url);
                    node.parent_links.is_empty()
                }
                None => false,
            };
            if orphaned {
                self.visited.remove(gone);
                tracing::debug!(url = %gone, "collected unreachable page");
            }
            if self.frontier.remove_parent(gone, url) == Some(true) {
                self.frontier.discard(gone);
                tracing::debug!(url = %gone, "dropped unreachable stub");
            }
        }
    }
}

pub struct Crawler {
    fetcher: Arc<dyn Fetcher>,
    analyzer: Arc<Analyzer>,
    options: CrawlOptions,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn Fetcher>, analyzer: Arc<Analyzer>, options: CrawlOptions) -> Self {
        Self { fetcher, analyzer, options }
    }

    /// Crawls at most `max_pages` pages breadth-first from `start_url`.
    /// Pages that `prior` already holds are fetched conditionally and reused
    /// as-is when the server reports them unchanged.
    pub async fn crawl(
        &self,
        start_url: &str,
        max_pages: usize,
        prior: Option<&Corpus>,
    ) -> Result<Corpus, CrawlError> {
        let start = Url::parse(start_url)
            .map_err(|source| CrawlError::InvalidStartUrl { url: start_url.to_string(), source })?;
        let start_url = norm(&start);
        let host = if self.options.same_host_only { start.host_str().map(str::to_string) } else { None };
        let mut state = CrawlState {
            start_url: start_url.clone(),
            host,
            prior,
            visited: BTreeMap::new(),
            frontier: Frontier::default(),
        };
        state.frontier.push(&start_url, BTreeSet::new());

        let concurrency = self.options.concurrency.max(1);
        let started = Instant::now();
        let mut inflight: JoinSet<Fetched> = JoinSet::new();
        tracing::info!(%start_url, max_pages, concurrency, "crawl started");

        loop {
            let remaining = match self.options.deadline {
                Some(d) => match d.checked_sub(started.elapsed()) {
                    Some(r) if !r.is_zero() => Some(r),
                    _ => {
                        tracing::warn!(in_flight = inflight.len(), "crawl deadline reached");
                        inflight.abort_all();
                        break;
                    }
                },
                None => None,
            };

            // Fill workers without letting visited + in flight pass the cap
            while inflight.len() < concurrency && state.visited.len() + inflight.len() < max_pages {
                let Some(url) = state.frontier.pop() else { break };
                let since = state.known_date(&url);
                let timeout = remaining.map_or(self.options.fetch_timeout, |r| r.min(self.options.fetch_timeout));
                let fetcher = Arc::clone(&self.fetcher);
                let analyzer = Arc::clone(&self.analyzer);
                inflight.spawn(async move {
                    let outcome = download(fetcher.as_ref(), &analyzer, &url, since, timeout).await;
                    Fetched { url, outcome }
                });
            }

            let joined = match remaining {
                Some(r) => match tokio::time::timeout(r, inflight.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        tracing::warn!(in_flight = inflight.len(), "crawl deadline reached");
                        inflight.abort_all();
                        break;
                    }
                },
                None => inflight.join_next().await,
            };
            let Some(joined) = joined else { break };
            match joined {
                Ok(fetched) => self.apply(&mut state, fetched).await,
                Err(e) => tracing::warn!(error = %e, "crawl worker failed"),
            }
        }

        tracing::info!(
            visited = state.visited.len(),
            queued = state.frontier.queued(),
            elapsed_s = started.elapsed().as_secs_f64(),
            "crawl finished"
        );
        Corpus::new(start_url.clone(), state.visited).ok_or(CrawlError::StartPageMissing { url: start_url })
    }

    async fn apply(&self, state: &mut CrawlState<'_>, fetched: Fetched) {
        let Fetched { url, outcome } = fetched;
        let Some(parents) = state.frontier.take(&url) else {
            tracing::debug!(%url, "stub collected while in flight, dropping fetch");
            return;
        };
        match outcome {
            Err(e) => {
                tracing::warn!(%url, error = %e, "fetch failed, skipping");
                if let Some(node) = state.visited.get_mut(&url) {
                    node.parent_links.extend(parents);
                }
            }
            Ok(Download::NotModified) => self.reinstate(state, &url, parents).await,
            Ok(Download::Page(content)) => self.install(state, &url, parents, content).await,
        }
    }

    /// The server reported the page unchanged: keep what we already know.
    async fn reinstate(&self, state: &mut CrawlState<'_>, url: &str, parents: BTreeSet<String>) {
        if let Some(node) = state.visited.get_mut(url) {
            node.parent_links.extend(parents);
            return;
        }
        let Some(known) = state.prior.and_then(|c| c.get(url)) else {
            tracing::warn!(%url, "not modified without a prior record, skipping");
            return;
        };
        let mut page = known.clone();
        page.parent_links = parents;
        page.child_links.retain(|l| state.follows(l));
        let children = page.child_links.clone();
        tracing::debug!(%url, "unchanged since last crawl");
        state.visited.insert(url.to_string(), page);
        self.link_children(state, url, &children).await;
    }

    async fn install(
        &self,
        state: &mut CrawlState<'_>,
        url: &str,
        mut parents: BTreeSet<String>,
        content: PageContent,
    ) {
        let modified = content.modified_at.unwrap_or_else(OffsetDateTime::now_utc);
        if let Some(stored) = state.visited.get(url).map(|p| p.last_modified) {
            if stored >= modified {
                if let Some(node) = state.visited.get_mut(url) {
                    node.parent_links.extend(parents);
                }
                tracing::debug!(%url, "stale fetch discarded");
                return;
            }
        }
        let previous = state.visited.remove(url);
        if let Some(prev) = &previous {
            parents.extend(prev.parent_links.iter().cloned());
        }

        let children: BTreeSet<String> = content.links.iter().filter(|l| state.follows(l)).cloned().collect();
        let page = content.into_page(url, parents, children.clone(), modified);
        tracing::debug!(%url, title = %page.title, size = page.size_bytes, children = children.len(), "page crawled");
        state.visited.insert(url.to_string(), page);

        self.link_children(state, url, &children).await;
        if let Some(prev) = previous {
            state.unlink_removed(url, &prev.child_links, &children);
        }
    }

    async fn link_children(&self, state: &mut CrawlState<'_>, url: &str, children: &BTreeSet<String>) {
        for child in children {
            if child == url {
                if let Some(node) = state.visited.get_mut(url) {
                    node.parent_links.insert(url.to_string());
                }
                continue;
            }
            if state.frontier.contains(child) {
                state.frontier.add_parent(child, url);
                if let Some(node) = state.visited.get_mut(child) {
                    node.parent_links.insert(url.to_string());
                }
                continue;
            }
            let Some(stored) = state.visited.get(child).map(|p| p.last_modified) else {
                state.frontier.push(child, BTreeSet::from([url.to_string()]));
                continue;
            };
            if self.changed_since(child, stored).await {
                let mut parents = state.visited.get(child).map(|p| p.parent_links.clone()).unwrap_or_default();
                parents.insert(url.to_string());
                state.frontier.push(child, parents);
                tracing::debug!(url = %child, "changed since visit, queued for refetch");
            } else if let Some(node) = state.visited.get_mut(child) {
                node.parent_links.insert(url.to_string());
            }
        }
    }

    async fn changed_since(&self, url: &str, stored: OffsetDateTime) -> bool {
        match self.fetcher.probe(url, self.options.fetch_timeout).await {
            Ok(probe) => probe.modified_at.map_or(false, |m| m > stored),
            Err(e) => {
                tracing::debug!(%url, error = %e, "probe failed, assuming unchanged");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sift_core::{FetchResponse, MemoryFetcher, ProbeResponse};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use time::macros::datetime;

    const ROOT: &str = "http://site.test/";

    fn url(path: &str) -> String {
        format!("http://site.test/{path}")
    }

    fn html(title: &str, body: &str, links: &[&str]) -> String {
        let anchors: String = links.iter().map(|l| format!(r#"<a href="{l}">{l}</a>"#)).collect();
        format!("<html><head><title>{title}</title></head><body><p>{body}</p>{anchors}</body></html>")
    }

    fn crawler(fetcher: Arc<dyn Fetcher>) -> Crawler {
        let options = CrawlOptions { concurrency: 1, ..CrawlOptions::default() };
        Crawler::new(fetcher, Arc::new(Analyzer::default()), options)
    }

    fn site() -> Arc<MemoryFetcher> {
        let at = datetime!(2024-03-01 12:00:00 UTC);
        let f = MemoryFetcher::new();
        f.insert(ROOT, html("Home", "welcome home", &["/a", "/b"]), Some(at));
        f.insert(&url("a"), html("A", "first page", &["/c", "/"]), Some(at));
        f.insert(&url("b"), html("B", "second page", &["/c"]), Some(at));
        f.insert(&url("c"), html("C", "third page", &[]), Some(at));
        Arc::new(f)
    }

    #[tokio::test]
    async fn crawls_breadth_first_up_to_the_cap() {
        let corpus = crawler(site()).crawl(ROOT, 3, None).await.unwrap();
        let urls: Vec<&str> = corpus.pages().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec![ROOT, url("a").as_str(), url("b").as_str()]);
        assert_eq!(corpus.start_page().title, "Home");
        assert_eq!(corpus.get(&url("a")).unwrap().parent_links, BTreeSet::from([ROOT.to_string()]));
        assert!(corpus.start_page().parent_links.contains(&url("a")));
    }

    #[tokio::test]
    async fn full_crawl_links_both_ways() {
        let corpus = crawler(site()).crawl(ROOT, 10, None).await.unwrap();
        assert_eq!(corpus.len(), 4);
        let c = corpus.get(&url("c")).unwrap();
        assert_eq!(c.parent_links, BTreeSet::from([url("a"), url("b")]));
        assert!(c.child_links.is_empty());
        assert_eq!(c.last_modified, datetime!(2024-03-01 12:00:00 UTC));
        assert!(c.body_keywords.contains_key("third page"));
    }

    #[tokio::test]
    async fn failed_fetches_are_skipped_and_not_counted() {
        let fetcher = site();
        fetcher.remove(&url("a"));
        let corpus = crawler(fetcher).crawl(ROOT, 3, None).await.unwrap();
        assert!(!corpus.contains(&url("a")));
        assert!(corpus.contains(&url("b")));
        assert!(corpus.contains(&url("c")));
        assert_eq!(corpus.len(), 3);
    }

    #[tokio::test]
    async fn missing_start_page_is_an_error() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let err = crawler(fetcher).crawl(ROOT, 5, None).await.unwrap_err();
        assert!(matches!(err, CrawlError::StartPageMissing { .. }));
        assert!(matches!(
            crawler(site()).crawl("not a url", 5, None).await,
            Err(CrawlError::InvalidStartUrl { .. })
        ));
    }

    #[tokio::test]
    async fn pages_without_a_date_are_stamped_now() {
        let f = MemoryFetcher::new();
        f.insert(ROOT, "<html><body>no title here</body></html>", None);
        let before = OffsetDateTime::now_utc();
        let corpus = crawler(Arc::new(f)).crawl(ROOT, 1, None).await.unwrap();
        let page = corpus.start_page();
        assert_eq!(page.title, UNTITLED);
        assert!(page.last_modified >= before);
    }

    #[tokio::test]
    async fn unchanged_recrawl_is_a_no_op() {
        let fetcher = site();
        let crawler = crawler(fetcher.clone());
        let first = crawler.crawl(ROOT, 10, None).await.unwrap();
        let second = crawler.crawl(ROOT, 10, Some(&first)).await.unwrap();
        assert!(second.same_content(&first));
        // every page came back 304 and was reused
        assert_eq!(fetcher.fetch_count(&url("c")), 2);
    }

    #[tokio::test]
    async fn dropped_link_leaves_orphan_out_of_next_crawl() {
        let fetcher = site();
        let crawler = crawler(fetcher.clone());
        let first = crawler.crawl(ROOT, 10, None).await.unwrap();
        assert!(first.contains(&url("b")));

        let later = datetime!(2024-03-02 12:00:00 UTC);
        fetcher.insert(ROOT, html("Home", "welcome home", &["/a"]), Some(later));
        let second = crawler.crawl(ROOT, 10, Some(&first)).await.unwrap();
        assert!(!second.contains(&url("b")));
        assert_eq!(second.get(&url("c")).unwrap().parent_links, BTreeSet::from([url("a")]));
        assert_eq!(second.start_page().last_modified, later);
    }

    /// Changes `/b` on the server the first time anything probes it. URLs in
    /// `delays` answer after the given wait.
    struct ChangingSite {
        inner: MemoryFetcher,
        changed: AtomicBool,
        delays: HashMap<String, Duration>,
    }

    impl ChangingSite {
        fn new(inner: MemoryFetcher) -> Self {
            Self { inner, changed: AtomicBool::new(false), delays: HashMap::new() }
        }
    }

    #[async_trait]
    impl Fetcher for ChangingSite {
        async fn fetch(
            &self,
            url: &str,
            since: Option<OffsetDateTime>,
            timeout: Duration,
        ) -> Result<FetchResponse, FetchError> {
            if let Some(delay) = self.delays.get(url) {
                tokio::time::sleep(*delay).await;
            }
            self.inner.fetch(url, since, timeout).await
        }

        async fn probe(&self, url: &str, timeout: Duration) -> Result<ProbeResponse, FetchError> {
            if url.ends_with("/b") && !self.changed.swap(true, Ordering::SeqCst) {
                let later = datetime!(2024-03-02 12:00:00 UTC);
                self.inner.insert(url, html("B2", "rewritten", &["/e"]), Some(later));
            }
            self.inner.probe(url, timeout).await
        }
    }

    #[tokio::test]
    async fn probe_triggers_refetch_and_collects_dropped_children() {
        let at = datetime!(2024-03-01 12:00:00 UTC);
        let inner = MemoryFetcher::new();
        inner.insert(ROOT, html("Home", "start", &["/b", "/c"]), Some(at));
        inner.insert(&url("b"), html("B", "old", &["/d"]), Some(at));
        inner.insert(&url("c"), html("C", "links back", &["/b"]), Some(at));
        inner.insert(&url("d"), html("D", "leaf", &[]), Some(at));
        inner.insert(&url("e"), html("E", "new leaf", &[]), Some(at));
        let fetcher = Arc::new(ChangingSite::new(inner));

        let corpus = crawler(fetcher.clone()).crawl(ROOT, 10, None).await.unwrap();
        let b = corpus.get(&url("b")).unwrap();
        assert_eq!(b.title, "B2");
        assert_eq!(b.parent_links, BTreeSet::from([ROOT.to_string(), url("c")]));
        assert_eq!(b.child_links, BTreeSet::from([url("e")]));
        assert!(!corpus.contains(&url("d")));
        assert!(corpus.contains(&url("e")));
        assert_eq!(fetcher.inner.fetch_count(&url("b")), 2);
    }

    #[tokio::test]
    async fn refetch_drops_unlinked_child_still_in_flight() {
        let at = datetime!(2024-03-01 12:00:00 UTC);
        let inner = MemoryFetcher::new();
        inner.insert(ROOT, html("Home", "start", &["/b", "/c"]), Some(at));
        inner.insert(&url("b"), html("B", "old", &["/d"]), Some(at));
        inner.insert(&url("c"), html("C", "links back", &["/b"]), Some(at));
        inner.insert(&url("d"), html("D", "slow leaf", &[]), Some(at));
        inner.insert(&url("e"), html("E", "new leaf", &[]), Some(at));
        let mut site = ChangingSite::new(inner);
        site.delays.insert(url("c"), Duration::from_millis(50));
        site.delays.insert(url("d"), Duration::from_millis(400));
        let fetcher = Arc::new(site);

        let options = CrawlOptions { concurrency: 3, ..CrawlOptions::default() };
        let corpus = Crawler::new(fetcher.clone(), Arc::new(Analyzer::default()), options)
            .crawl(ROOT, 10, None)
            .await
            .unwrap();

        // /d was still being fetched when /b's new version dropped it
        assert_eq!(fetcher.inner.fetch_count(&url("d")), 1);
        assert!(!corpus.contains(&url("d")));
        let b = corpus.get(&url("b")).unwrap();
        assert_eq!(b.title, "B2");
        assert_eq!(b.child_links, BTreeSet::from([url("e")]));
        assert!(corpus.contains(&url("e")));
        assert_eq!(corpus.len(), 4);
    }

    #[tokio::test]
    async fn same_host_only_skips_foreign_links() {
        let at = datetime!(2024-03-01 12:00:00 UTC);
        let f = MemoryFetcher::new();
        f.insert(ROOT, html("Home", "x", &["/a", "http://elsewhere.test/"]), Some(at));
        f.insert(&url("a"), html("A", "y", &[]), Some(at));
        f.insert("http://elsewhere.test/", html("Other", "z", &[]), Some(at));
        let options = CrawlOptions { concurrency: 2, same_host_only: true, ..CrawlOptions::default() };
        let corpus = Crawler::new(Arc::new(f), Arc::new(Analyzer::default()), options)
            .crawl(ROOT, 10, None)
            .await
            .unwrap();
        assert_eq!(corpus.len(), 2);
        assert!(!corpus.start_page().child_links.contains("http://elsewhere.test/"));
    }
}
