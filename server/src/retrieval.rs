//! Vector-space ranking over the body and title indices.
//!
//! Document vectors are max-normalized per index and merged with the title
//! side scaled by [`RankingWeights::title_weight`]. Queries are weighted with
//! the same idf formula the indexer uses and L2-normalized, then scored by
//! cosine similarity. Quoted phrases multiply the score of documents holding
//! every phrase token in their title (or, failing that, body) vector.

use crate::query::ParsedQuery;
use sift_core::{Analyzer, Corpus, Fetcher, InvertedIndex, Page};
use sift_indexer::idf;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

pub type TermVector = HashMap<String, f64>;

/// URL to term weights.
pub type DocVectors = HashMap<String, TermVector>;

#[derive(Debug, Clone, PartialEq)]
pub struct RankingWeights {
    pub title_weight: f64,
    pub title_phrase_boost: f64,
    pub body_phrase_boost: f64,
    pub phrase_token_weight: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self { title_weight: 2.0, title_phrase_boost: 3.0, body_phrase_boost: 1.5, phrase_token_weight: 0.5 }
    }
}

/// Divides every weight by the vector's largest one. Vectors whose largest
/// weight is not positive are left as they are.
pub fn max_normalize(vector: &mut TermVector) {
    let max = vector.values().copied().fold(f64::NEG_INFINITY, f64::max);
    if max > 0.0 {
        for w in vector.values_mut() {
            *w /= max;
        }
    }
}

pub fn l2_norm(vector: &TermVector) -> f64 {
    vector.values().map(|w| w * w).sum::<f64>().sqrt()
}

pub fn l2_normalize(vector: &mut TermVector) {
    let norm = l2_norm(vector);
    if norm > 0.0 {
        for w in vector.values_mut() {
            *w /= norm;
        }
    }
}

/// Cosine similarity, 0 when either side has zero norm.
pub fn cosine(doc: &TermVector, query: &TermVector) -> f64 {
    let (dn, qn) = (l2_norm(doc), l2_norm(query));
    if dn == 0.0 || qn == 0.0 {
        return 0.0;
    }
    let dot: f64 = query.iter().filter_map(|(t, qw)| doc.get(t).map(|dw| dw * qw)).sum();
    dot / (dn * qn)
}

/// Per-document tf-idf vectors of one index, max-normalized.
pub fn document_vectors(index: &InvertedIndex) -> DocVectors {
    let mut vectors: DocVectors = HashMap::new();
    for (term, plist) in &index.postings {
        for p in plist {
            vectors.entry(p.url.clone()).or_default().insert(term.clone(), p.tf_idf);
        }
    }
    for vector in vectors.values_mut() {
        max_normalize(vector);
    }
    vectors
}

/// `body + title_weight * title`, term by term.
pub fn merge_vectors(body: &DocVectors, title: &DocVectors, title_weight: f64) -> DocVectors {
    let mut merged = body.clone();
    for (url, vector) in title {
        let entry = merged.entry(url.clone()).or_default();
        for (term, w) in vector {
            *entry.entry(term.clone()).or_insert(0.0) += title_weight * w;
        }
    }
    merged
}

/// Ranking state for one pair of indices. Built once per snapshot and
/// shared read-only between queries.
#[derive(Debug, Clone)]
pub struct Retriever {
    body: DocVectors,
    title: DocVectors,
    merged: DocVectors,
    doc_freq: HashMap<String, usize>,
    total_docs: usize,
    weights: RankingWeights,
}

impl Retriever {
    pub fn new(body_index: &InvertedIndex, title_index: &InvertedIndex, weights: RankingWeights) -> Self {
        let mut holders: HashMap<&str, HashSet<&str>> = HashMap::new();
        for index in [body_index, title_index] {
            for (term, plist) in &index.postings {
                holders.entry(term.as_str()).or_default().extend(plist.iter().map(|p| p.url.as_str()));
            }
        }
        let doc_freq = holders.into_iter().map(|(term, urls)| (term.to_string(), urls.len())).collect();

        let mut urls = body_index.urls();
        urls.extend(title_index.urls());
        let total_docs = urls.len().max(1);

        let body = document_vectors(body_index);
        let title = document_vectors(title_index);
        let merged = merge_vectors(&body, &title, weights.title_weight);
        Self { body, title, merged, doc_freq, total_docs, weights }
    }

    pub fn total_docs(&self) -> usize {
        self.total_docs
    }

    pub fn weights(&self) -> &RankingWeights {
        &self.weights
    }

    /// Distinct URLs holding `term` in either index.
    pub fn doc_freq(&self, term: &str) -> usize {
        self.doc_freq.get(term).copied().unwrap_or(0)
    }

    /// L2-normalized `tf * idf` weights for the query.
    pub fn query_vector(&self, query: &ParsedQuery) -> TermVector {
        let mut vector: TermVector = query
            .weighted_terms(self.weights.phrase_token_weight)
            .into_iter()
            .map(|(term, tf)| {
                let w = tf * idf(self.total_docs, self.doc_freq(&term));
                (term, w)
            })
            .collect();
        l2_normalize(&mut vector);
        vector
    }

    fn phrase_boost(&self, url: &str, phrase: &[String]) -> f64 {
        let holds = |vectors: &DocVectors| {
            vectors.get(url).map_or(false, |v| phrase.iter().all(|t| v.contains_key(t)))
        };
        if holds(&self.title) {
            self.weights.title_phrase_boost
        } else if holds(&self.body) {
            self.weights.body_phrase_boost
        } else {
            1.0
        }
    }

    /// Positive-scoring URLs, best first, at most `max_results`. Equal
    /// scores are ordered by URL.
    pub fn rank(&self, query: &ParsedQuery, max_results: usize) -> Vec<(String, f64)> {
        let qv = self.query_vector(query);
        let mut scored: Vec<(String, f64)> = self
            .merged
            .iter()
            .map(|(url, doc)| {
                let base = cosine(doc, &qv);
                let score = query.phrases.iter().fold(base, |s, phrase| s * self.phrase_boost(url, phrase));
                (url.clone(), score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(max_results);
        scored
    }
}

/// A ranked URL resolved to a page where possible.
#[derive(Debug, Clone)]
pub enum SearchHit {
    Page(Page),
    /// Neither the corpus nor a live fetch could describe the URL.
    Url(String),
}

impl SearchHit {
    pub fn url(&self) -> &str {
        match self {
            SearchHit::Page(page) => &page.url,
            SearchHit::Url(url) => url,
        }
    }

    pub fn page(&self) -> Option<&Page> {
        match self {
            SearchHit::Page(page) => Some(page),
            SearchHit::Url(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredHit {
    pub hit: SearchHit,
    pub score: f64,
}

/// Corpus page if present, else a one-off fetch that is never persisted,
/// else the bare URL.
pub async fn resolve_hit(
    url: &str,
    corpus: Option<&Corpus>,
    fetcher: &dyn Fetcher,
    analyzer: &Analyzer,
    timeout: Duration,
) -> SearchHit {
    if let Some(page) = corpus.and_then(|c| c.get(url)) {
        return SearchHit::Page(page.clone());
    }
    match sift_crawler::fetch_page(fetcher, analyzer, url, timeout).await {
        Ok(page) => SearchHit::Page(page),
        Err(e) => {
            tracing::debug!(url, error = %e, "could not describe hit, returning bare url");
            SearchHit::Url(url.to_string())
        }
    }
}

pub async fn materialize(
    ranked: Vec<(String, f64)>,
    corpus: &Corpus,
    fetcher: &dyn Fetcher,
    analyzer: &Analyzer,
    timeout: Duration,
) -> Vec<ScoredHit> {
    let mut hits = Vec::with_capacity(ranked.len());
    for (url, score) in ranked {
        let hit = resolve_hit(&url, Some(corpus), fetcher, analyzer, timeout).await;
        hits.push(ScoredHit { hit, score });
    }
    hits
}

/// Everything a one-shot search needs besides the corpus and indices.
pub struct SearchContext<'a> {
    pub analyzer: &'a Analyzer,
    pub fetcher: &'a dyn Fetcher,
    pub weights: RankingWeights,
    pub fetch_timeout: Duration,
}

/// Parses, ranks and materializes `query` against one snapshot.
pub async fn search(
    query: &str,
    corpus: &Corpus,
    body: &InvertedIndex,
    title: &InvertedIndex,
    max_results: usize,
    ctx: &SearchContext<'_>,
) -> Vec<ScoredHit> {
    let parsed = ParsedQuery::parse(query, ctx.analyzer);
    if parsed.is_empty() {
        return Vec::new();
    }
    let ranked = Retriever::new(body, title, ctx.weights.clone()).rank(&parsed, max_results);
    materialize(ranked, corpus, ctx.fetcher, ctx.analyzer, ctx.fetch_timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::fetch::DEFAULT_FETCH_TIMEOUT;
    use sift_core::MemoryFetcher;
    use sift_indexer::build_indices;

    fn page(url: &str, title: &str, body: &str) -> Page {
        let mut p = Page::stub(url);
        p.title = title.to_string();
        p.body_keywords = Analyzer::default().body_keywords(body);
        p
    }

    fn corpus(pages: Vec<Page>) -> Corpus {
        let start = pages[0].url.clone();
        Corpus::from_pages(start, pages).unwrap()
    }

    fn retriever(c: &Corpus) -> Retriever {
        let (body, title) = build_indices(c, &Analyzer::default());
        Retriever::new(&body, &title, RankingWeights::default())
    }

    fn fox_corpus() -> Corpus {
        corpus(vec![
            page("http://a.test/a", "The Quick Fox", "lorem ipsum"),
            page("http://a.test/b", "Fox", "quick fox ran"),
            page("http://a.test/c", "Gardening", "tomato plants"),
            page("http://a.test/d", "Cooking", "bread recipes"),
        ])
    }

    fn score_of(ranked: &[(String, f64)], url: &str) -> f64 {
        ranked.iter().find(|(u, _)| u == url).map(|(_, s)| *s).unwrap_or(0.0)
    }

    #[test]
    fn document_vectors_peak_at_one() {
        let r = retriever(&fox_corpus());
        for vectors in [&r.body, &r.title] {
            for vector in vectors.values() {
                let max = vector.values().copied().fold(f64::NEG_INFINITY, f64::max);
                if max > 0.0 {
                    assert!((max - 1.0).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn query_vector_has_unit_length() {
        let r = retriever(&fox_corpus());
        let q = ParsedQuery::parse(r#"bread "quick fox" tomato"#, &Analyzer::default());
        let v = r.query_vector(&q);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_guards_zero_vectors() {
        let zero = TermVector::new();
        let one: TermVector = [("a".to_string(), 1.0)].into();
        assert_eq!(cosine(&zero, &one), 0.0);
        assert_eq!(cosine(&one, &zero), 0.0);
        assert!((cosine(&one, &one) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn merge_scales_title_side() {
        let body: DocVectors = [("u".to_string(), [("x".to_string(), 1.0)].into())].into();
        let title: DocVectors = [("u".to_string(), [("x".to_string(), 0.5), ("y".to_string(), 1.0)].into())].into();
        let merged = merge_vectors(&body, &title, 2.0);
        assert_eq!(merged["u"]["x"], 2.0);
        assert_eq!(merged["u"]["y"], 2.0);
    }

    #[test]
    fn term_held_by_half_of_two_docs_finds_nothing() {
        let c = corpus(vec![page("http://a.test/a", "", "cat dog cat"), page("http://a.test/b", "", "dog")]);
        let (body, _) = build_indices(&c, &Analyzer::default());
        let r = Retriever::new(&body, &InvertedIndex::new(), RankingWeights::default());
        let q = ParsedQuery::parse("cat", &Analyzer::default());
        assert!(r.query_vector(&q).values().all(|w| *w == 0.0));
        assert!(r.rank(&q, 10).is_empty());
    }

    #[test]
    fn title_phrase_beats_unordered_terms() {
        let r = retriever(&fox_corpus());
        let analyzer = Analyzer::default();
        let plain = r.rank(&ParsedQuery::parse("quick fox", &analyzer), 10);
        let phrase = r.rank(&ParsedQuery::parse(r#""quick fox""#, &analyzer), 10);

        let (plain_a, phrase_a) = (score_of(&plain, "http://a.test/a"), score_of(&phrase, "http://a.test/a"));
        assert!(plain_a > 0.0);
        assert!((phrase_a - 3.0 * plain_a).abs() < 1e-9);

        let (plain_b, phrase_b) = (score_of(&plain, "http://a.test/b"), score_of(&phrase, "http://a.test/b"));
        assert!(plain_b > 0.0);
        assert!((phrase_b - 1.5 * plain_b).abs() < 1e-9);
    }

    #[test]
    fn ranking_is_sorted_positive_and_truncated() {
        let r = retriever(&fox_corpus());
        let q = ParsedQuery::parse("fox quick tomato", &Analyzer::default());
        let all = r.rank(&q, 10);
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].1 >= w[1].1));
        assert!(all.iter().all(|(_, s)| *s > 0.0));
        assert_eq!(r.rank(&q, 1), all[..1].to_vec());
        assert!(r.rank(&ParsedQuery::default(), 10).is_empty());
    }

    #[tokio::test]
    async fn hits_fall_back_to_fetch_then_bare_url() {
        let c = fox_corpus();
        let fetcher = MemoryFetcher::new();
        fetcher.insert("http://live.test/", "<title>Live</title><body>now</body>", None);
        let analyzer = Analyzer::default();
        let ranked = vec![
            ("http://a.test/b".to_string(), 0.9),
            ("http://live.test/".to_string(), 0.5),
            ("http://gone.test/".to_string(), 0.1),
        ];
        let hits = materialize(ranked, &c, &fetcher, &analyzer, DEFAULT_FETCH_TIMEOUT).await;
        assert_eq!(hits[0].hit.page().map(|p| p.title.as_str()), Some("Fox"));
        assert_eq!(hits[1].hit.page().map(|p| p.title.as_str()), Some("Live"));
        assert!(matches!(&hits[2].hit, SearchHit::Url(u) if u == "http://gone.test/"));
        assert_eq!(hits[2].score, 0.1);
    }

    #[tokio::test]
    async fn one_shot_search_returns_pages() {
        let c = fox_corpus();
        let (body, title) = build_indices(&c, &Analyzer::default());
        let fetcher = MemoryFetcher::new();
        let analyzer = Analyzer::default();
        let ctx = SearchContext {
            analyzer: &analyzer,
            fetcher: &fetcher,
            weights: RankingWeights::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        };
        let hits = search("bread", &c, &body, &title, 5, &ctx).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].hit.url(), "http://a.test/d");
        assert!(search("\"unclosed", &c, &body, &title, 5, &ctx).await.is_empty());
        assert_eq!(fetcher.fetch_count("http://a.test/d"), 0);
    }
}
