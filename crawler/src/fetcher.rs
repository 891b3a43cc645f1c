//! reqwest-backed [`Fetcher`].

use async_trait::async_trait;
use reqwest::{header, redirect::Policy, Client, StatusCode};
use sift_core::fetch::{format_http_date, parse_http_date};
use sift_core::{FetchError, FetchResponse, Fetcher, ProbeResponse};
use std::time::Duration;
use time::OffsetDateTime;

pub const DEFAULT_USER_AGENT: &str = "sift-bot/0.1 (+https://example.com/bot)";

/// Bodies larger than this are skipped.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent.to_string())
            .redirect(Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }
}

fn classify(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout { url: url.to_string() }
    } else {
        FetchError::Transport { url: url.to_string(), message: e.to_string() }
    }
}

fn last_modified(headers: &header::HeaderMap) -> Option<OffsetDateTime> {
    headers
        .get(header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        if_modified_since: Option<OffsetDateTime>,
        timeout: Duration,
    ) -> Result<FetchResponse, FetchError> {
        let mut req = self.client.get(url).timeout(timeout);
        if let Some(since) = if_modified_since {
            req = req.header(header::IF_MODIFIED_SINCE, format_http_date(since));
        }
        let resp = req.send().await.map_err(|e| classify(url, e))?;
        let status = resp.status();
        let modified_at = last_modified(resp.headers());
        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchResponse { modified_at, not_modified: true, body: Vec::new() });
        }
        if !status.is_success() {
            return Err(FetchError::Status { url: url.to_string(), status: status.as_u16() });
        }
        if let Some(ct) = resp.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
            if !ct.starts_with("text/html") {
                return Err(FetchError::Unsupported { url: url.to_string(), reason: ct.to_string() });
            }
        }
        let bytes = resp.bytes().await.map_err(|e| classify(url, e))?;
        if bytes.len() > MAX_BODY_BYTES {
            return Err(FetchError::Unsupported {
                url: url.to_string(),
                reason: format!("body of {} bytes", bytes.len()),
            });
        }
        Ok(FetchResponse { modified_at, not_modified: false, body: bytes.to_vec() })
    }

    async fn probe(&self, url: &str, timeout: Duration) -> Result<ProbeResponse, FetchError> {
        let resp = self.client.head(url).timeout(timeout).send().await.map_err(|e| classify(url, e))?;
        if !resp.status().is_success() {
            return Err(FetchError::Status { url: url.to_string(), status: resp.status().as_u16() });
        }
        Ok(ProbeResponse { modified_at: last_modified(resp.headers()) })
    }
}
