use crate::codec::{self, CodecError, PageRow};
use crate::index::InvertedIndex;
use crate::page::Corpus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const STORE_VERSION: u32 = 1;

const META_KEY: &[u8] = b"meta";
const PAGES_TABLE: &str = "pages";
const BODY_TABLE: &str = "body";
const TITLE_TABLE: &str = "title";

/// Failures that must reach the caller. Rows that merely fail to decode are
/// not errors: the load reports the store as absent instead.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store at {path}: {source}")]
    Open { path: PathBuf, source: sled::Error },

    #[error("store error: {0}")]
    Sled(#[from] sled::Error),

    #[error("row encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("meta encoding error: {0}")]
    Meta(#[from] serde_json::Error),

    #[error("field encoding error: {0}")]
    Codec(#[from] CodecError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusMeta {
    pub num_docs: u32,
    pub created_at: String,
    pub version: u32,
    pub start_url: String,
    pub max_pages: usize,
}

impl CorpusMeta {
    /// Time since the corpus was written. Unparseable stamps count as ancient.
    pub fn age(&self) -> Duration {
        match OffsetDateTime::parse(&self.created_at, &Rfc3339) {
            Ok(created) => {
                let elapsed = OffsetDateTime::now_utc() - created;
                Duration::try_from(elapsed).unwrap_or(Duration::ZERO)
            }
            Err(_) => Duration::MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub num_docs: u32,
    pub created_at: String,
    pub version: u32,
    /// `created_at` of the corpus the indices were built from.
    pub corpus_created_at: String,
}

pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn corpus(&self) -> PathBuf { self.root.join("corpus") }
    pub fn index(&self) -> PathBuf { self.root.join("index") }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "".into())
}

fn open_db(path: &Path) -> StoreResult<sled::Db> {
    sled::open(path).map_err(|source| StoreError::Open { path: path.to_path_buf(), source })
}

/// The corpus and index databases under one data directory.
///
/// Both databases stay open for the lifetime of the store and clones share
/// the handles. sled locks the directory while a database is open: open one
/// store per data directory and pass clones around.
#[derive(Clone)]
pub struct Store {
    root: PathBuf,
    corpus: sled::Db,
    index: sled::Db,
}

impl Store {
    pub fn open(paths: &DataPaths) -> StoreResult<Self> {
        Ok(Self {
            root: paths.root.clone(),
            corpus: open_db(&paths.corpus())?,
            index: open_db(&paths.index())?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Replaces the persisted corpus. Returns the meta record written alongside it.
    pub fn save_corpus(&self, corpus: &Corpus, max_pages: usize) -> StoreResult<CorpusMeta> {
        let mut rows = BTreeMap::new();
        for page in corpus.pages() {
            let row = PageRow::from_page(page, page.url == corpus.start_url())?;
            rows.insert(page.url.as_bytes().to_vec(), bincode::serialize(&row)?);
        }
        invalidate(&self.corpus)?;
        replace_table(&self.corpus.open_tree(PAGES_TABLE)?, rows)?;
        let meta = CorpusMeta {
            num_docs: corpus.len() as u32,
            created_at: now_rfc3339(),
            version: STORE_VERSION,
            start_url: corpus.start_url().to_string(),
            max_pages,
        };
        self.corpus.insert(META_KEY, serde_json::to_vec_pretty(&meta)?)?;
        self.corpus.flush()?;
        Ok(meta)
    }

    /// Loads the persisted corpus. An empty store, an undecodable row or a
    /// missing start page all come back as `Ok(None)`.
    pub fn load_corpus(&self) -> StoreResult<Option<(Corpus, CorpusMeta)>> {
        let Some(meta) = read_meta::<CorpusMeta>(&self.corpus)? else {
            return Ok(None);
        };
        let tree = self.corpus.open_tree(PAGES_TABLE)?;
        let mut pages = BTreeMap::new();
        let mut start_url = None;
        for entry in tree.iter() {
            let (key, value) = entry?;
            let decoded = String::from_utf8(key.to_vec())
                .ok()
                .and_then(|url| {
                    let row: PageRow = bincode::deserialize(&value).ok()?;
                    let is_start = row.is_start;
                    row.into_page(url).ok().map(|page| (page, is_start))
                });
            let Some((page, is_start)) = decoded else {
                tracing::warn!(root = %self.root.display(), "corrupt page row, ignoring persisted corpus");
                return Ok(None);
            };
            if is_start {
                start_url = Some(page.url.clone());
            }
            pages.insert(page.url.clone(), page);
        }
        let Some(start_url) = start_url else {
            tracing::warn!(root = %self.root.display(), "persisted corpus has no start page");
            return Ok(None);
        };
        Ok(Corpus::new(start_url, pages).map(|corpus| (corpus, meta)))
    }

    pub fn save_indices(
        &self,
        body: &InvertedIndex,
        title: &InvertedIndex,
        corpus_meta: &CorpusMeta,
    ) -> StoreResult<IndexMeta> {
        invalidate(&self.index)?;
        replace_table(&self.index.open_tree(BODY_TABLE)?, index_rows(body))?;
        replace_table(&self.index.open_tree(TITLE_TABLE)?, index_rows(title))?;
        let meta = IndexMeta {
            num_docs: body.num_docs as u32,
            created_at: now_rfc3339(),
            version: STORE_VERSION,
            corpus_created_at: corpus_meta.created_at.clone(),
        };
        self.index.insert(META_KEY, serde_json::to_vec_pretty(&meta)?)?;
        self.index.flush()?;
        Ok(meta)
    }

    /// Loads the (body, title) indices, or `Ok(None)` when absent or corrupt.
    pub fn load_indices(&self) -> StoreResult<Option<(InvertedIndex, InvertedIndex, IndexMeta)>> {
        let Some(meta) = read_meta::<IndexMeta>(&self.index)? else {
            return Ok(None);
        };
        let num_docs = meta.num_docs as usize;
        let body = read_index(&self.index.open_tree(BODY_TABLE)?, num_docs)?;
        let title = read_index(&self.index.open_tree(TITLE_TABLE)?, num_docs)?;
        match (body, title) {
            (Some(body), Some(title)) => Ok(Some((body, title, meta))),
            _ => {
                tracing::warn!(root = %self.root.display(), "corrupt index table, ignoring persisted indices");
                Ok(None)
            }
        }
    }
}

/// Drops the meta record and makes that durable. Until a new meta is written
/// the store loads as absent, whatever state its tables are left in.
fn invalidate(db: &sled::Db) -> StoreResult<()> {
    db.remove(META_KEY)?;
    db.flush()?;
    Ok(())
}

/// Swaps the table contents for `rows` in one atomic batch.
fn replace_table(tree: &sled::Tree, rows: BTreeMap<Vec<u8>, Vec<u8>>) -> StoreResult<()> {
    let mut batch = sled::Batch::default();
    for key in tree.iter().keys() {
        let key = key?;
        if !rows.contains_key(&*key) {
            batch.remove(key);
        }
    }
    for (key, value) in rows {
        batch.insert(key, value);
    }
    tree.apply_batch(batch)?;
    Ok(())
}

fn index_rows(index: &InvertedIndex) -> BTreeMap<Vec<u8>, Vec<u8>> {
    index
        .postings
        .iter()
        .map(|(term, postings)| (term.as_bytes().to_vec(), codec::encode_postings(postings).into_bytes()))
        .collect()
}

fn read_meta<T: for<'de> Deserialize<'de>>(db: &sled::Db) -> StoreResult<Option<T>> {
    let Some(raw) = db.get(META_KEY)? else {
        return Ok(None);
    };
    match serde_json::from_slice(&raw) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) => {
            tracing::warn!(error = %e, "unreadable store meta");
            Ok(None)
        }
    }
}

fn read_index(tree: &sled::Tree, num_docs: usize) -> StoreResult<Option<InvertedIndex>> {
    let mut index = InvertedIndex { num_docs, ..InvertedIndex::default() };
    for entry in tree.iter() {
        let (key, value) = entry?;
        let (Ok(term), Ok(raw)) = (std::str::from_utf8(&key), std::str::from_utf8(&value)) else {
            return Ok(None);
        };
        let Ok(postings) = codec::decode_postings(raw) else {
            return Ok(None);
        };
        index.postings.insert(term.to_string(), postings);
    }
    Ok(Some(index))
}
