//! In-memory stand-ins for the network, for tests in this and dependent crates.

use crate::fetch::{FetchError, FetchResponse, Fetcher, ProbeResponse};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Debug, Clone)]
struct Resource {
    html: String,
    modified_at: Option<OffsetDateTime>,
}

/// Serves a fixed set of HTML documents from memory, honouring conditional
/// requests the way an HTTP server would. Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    resources: RwLock<HashMap<String, Resource>>,
    fetches: RwLock<HashMap<String, usize>>,
    offline: RwLock<bool>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &str, html: impl Into<String>, modified_at: Option<OffsetDateTime>) {
        self.resources
            .write()
            .insert(url.to_string(), Resource { html: html.into(), modified_at });
    }

    pub fn remove(&self, url: &str) {
        self.resources.write().remove(url);
    }

    /// When offline every request fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        *self.offline.write() = offline;
    }

    /// Number of full fetches (not probes) issued for `url`.
    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.read().get(url).copied().unwrap_or(0)
    }

    fn lookup(&self, url: &str) -> Result<Resource, FetchError> {
        if *self.offline.read() {
            return Err(FetchError::Transport { url: url.to_string(), message: "offline".into() });
        }
        self.resources
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status { url: url.to_string(), status: 404 })
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(
        &self,
        url: &str,
        if_modified_since: Option<OffsetDateTime>,
        _timeout: Duration,
    ) -> Result<FetchResponse, FetchError> {
        *self.fetches.write().entry(url.to_string()).or_insert(0) += 1;
        let res = self.lookup(url)?;
        let unchanged = match (if_modified_since, res.modified_at) {
            (Some(since), Some(modified)) => modified <= since,
            _ => false,
        };
        if unchanged {
            return Ok(FetchResponse { modified_at: res.modified_at, not_modified: true, body: Vec::new() });
        }
        Ok(FetchResponse { modified_at: res.modified_at, not_modified: false, body: res.html.into_bytes() })
    }

    async fn probe(&self, url: &str, _timeout: Duration) -> Result<ProbeResponse, FetchError> {
        let res = self.lookup(url)?;
        Ok(ProbeResponse { modified_at: res.modified_at })
    }
}
