use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use time::OffsetDateTime;

/// Title recorded for pages without a usable `<title>`.
pub const UNTITLED: &str = "Untitled";

/// A crawled document. Identity is the URL alone: two values with the same
/// URL compare equal whatever their other fields hold.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub title: String,
    pub last_modified: OffsetDateTime,
    pub size_bytes: u64,
    /// Raw occurrence counts keyed by single word or space-joined phrase.
    pub body_keywords: BTreeMap<String, u32>,
    pub parent_links: BTreeSet<String>,
    pub child_links: BTreeSet<String>,
}

impl Page {
    /// A bare node that only knows its URL.
    pub fn stub(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: UNTITLED.to_string(),
            last_modified: OffsetDateTime::UNIX_EPOCH,
            size_bytes: 0,
            body_keywords: BTreeMap::new(),
            parent_links: BTreeSet::new(),
            child_links: BTreeSet::new(),
        }
    }

    /// Field-by-field comparison, unlike `==` which only looks at the URL.
    pub fn same_content(&self, other: &Page) -> bool {
        self.url == other.url
            && self.title == other.title
            && self.last_modified == other.last_modified
            && self.size_bytes == other.size_bytes
            && self.body_keywords == other.body_keywords
            && self.parent_links == other.parent_links
            && self.child_links == other.child_links
    }
}

impl PartialEq for Page {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Page {}

impl Hash for Page {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

/// The output of a crawl: every reachable page plus the designated start page,
/// which is always present.
#[derive(Debug, Clone)]
pub struct Corpus {
    start_url: String,
    pages: BTreeMap<String, Page>,
}

impl Corpus {
    /// Returns `None` when `pages` holds no entry for `start_url`.
    pub fn new(start_url: impl Into<String>, pages: BTreeMap<String, Page>) -> Option<Self> {
        let start_url = start_url.into();
        if !pages.contains_key(&start_url) {
            return None;
        }
        Some(Self { start_url, pages })
    }

    pub fn from_pages(start_url: impl Into<String>, pages: impl IntoIterator<Item = Page>) -> Option<Self> {
        let pages = pages.into_iter().map(|p| (p.url.clone(), p)).collect();
        Self::new(start_url, pages)
    }

    pub fn start_url(&self) -> &str {
        &self.start_url
    }

    pub fn start_page(&self) -> &Page {
        &self.pages[&self.start_url]
    }

    pub fn get(&self, url: &str) -> Option<&Page> {
        self.pages.get(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.pages.contains_key(url)
    }

    /// Pages in URL order.
    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.values()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Field-by-field equality of every page and of the start URL.
    pub fn same_content(&self, other: &Corpus) -> bool {
        self.start_url == other.start_url
            && self.pages.len() == other.pages.len()
            && self
                .pages
                .iter()
                .all(|(url, page)| other.pages.get(url).map_or(false, |o| page.same_content(o)))
    }
}
