use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One document's entry in a term's postings list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub url: String,
    pub tf: u32,
    pub tf_idf: f64,
}

/// Stemmed term (or space-joined phrase) to postings, sorted by URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvertedIndex {
    pub postings: BTreeMap<String, Vec<Posting>>,
    pub num_docs: usize,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, term: &str) -> Option<&[Posting]> {
        self.postings.get(term).map(Vec::as_slice)
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.postings.keys().map(String::as_str)
    }

    /// Every URL holding at least one posting.
    pub fn urls(&self) -> BTreeSet<&str> {
        self.postings
            .values()
            .flat_map(|plist| plist.iter().map(|p| p.url.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }
}
