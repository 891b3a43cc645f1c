//! Builds the body and title inverted indices from a crawl corpus.
//!
//! Body postings come from each page's stored keyword counts, stemmed word by
//! word so phrases and single words share one stemmer. Title postings are
//! recomputed from the title text. Weights are `tf * ln(N / (1 + df))`.

use sift_core::{Analyzer, Corpus, InvertedIndex, Page, Posting};
use std::collections::{BTreeMap, HashMap};

/// `ln(num_docs / (1 + df))`, or 0 for an empty corpus.
pub fn idf(num_docs: usize, df: usize) -> f64 {
    if num_docs == 0 {
        return 0.0;
    }
    (num_docs as f64 / (1.0 + df as f64)).ln()
}

#[derive(Default)]
struct Accumulator {
    postings: BTreeMap<String, Vec<(String, u32)>>,
    df: HashMap<String, usize>,
}

impl Accumulator {
    /// `terms` holds each distinct stemmed term of one page once, so every
    /// term gets exactly one posting and one df increment per page.
    fn add_page(&mut self, url: &str, terms: BTreeMap<String, u32>) {
        for (term, tf) in terms {
            *self.df.entry(term.clone()).or_insert(0) += 1;
            self.postings.entry(term).or_default().push((url.to_string(), tf));
        }
    }

    fn finish(self, num_docs: usize) -> InvertedIndex {
        let Accumulator { postings, df } = self;
        let postings = postings
            .into_iter()
            .map(|(term, plist)| {
                let idf = idf(num_docs, df.get(&term).copied().unwrap_or(0));
                let plist = plist
                    .into_iter()
                    .map(|(url, tf)| Posting { url, tf, tf_idf: tf as f64 * idf })
                    .collect();
                (term, plist)
            })
            .collect();
        InvertedIndex { postings, num_docs }
    }
}

/// A page's body keywords re-keyed by stemmed form. Keywords that stem to
/// the same key are summed.
pub fn stemmed_body_terms(page: &Page, analyzer: &Analyzer) -> BTreeMap<String, u32> {
    let mut out: BTreeMap<String, u32> = BTreeMap::new();
    for (term, freq) in &page.body_keywords {
        let stemmed = analyzer.stem_phrase(term);
        if stemmed.is_empty() {
            continue;
        }
        *out.entry(stemmed).or_insert(0) += freq;
    }
    out
}

/// Returns `(body, title)` indices over every page of `corpus`.
pub fn build_indices(corpus: &Corpus, analyzer: &Analyzer) -> (InvertedIndex, InvertedIndex) {
    let mut body = Accumulator::default();
    let mut title = Accumulator::default();
    for page in corpus.pages() {
        body.add_page(&page.url, stemmed_body_terms(page, analyzer));
        title.add_page(&page.url, analyzer.title_terms(&page.title));
    }
    let num_docs = corpus.len();
    let (body, title) = (body.finish(num_docs), title.finish(num_docs));
    tracing::info!(num_docs, body_terms = body.len(), title_terms = title.len(), "indices built");
    (body, title)
}
