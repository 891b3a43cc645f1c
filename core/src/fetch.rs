//! The fetch contract shared by the crawler and the retrieval fallback.
//!
//! Every [`FetchError`] is a skip-and-continue condition: the page in question
//! is dropped and the caller moves on.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use time::format_description::well_known::Rfc2822;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Per-request timeout used unless configured otherwise.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("unsupported content at {url}: {reason}")]
    Unsupported { url: String, reason: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Timeout { url }
            | FetchError::Status { url, .. }
            | FetchError::Transport { url, .. }
            | FetchError::Unsupported { url, .. } => url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Parsed `Last-Modified`, when present.
    pub modified_at: Option<OffsetDateTime>,
    /// The server answered a conditional request with `304 Not Modified`.
    pub not_modified: bool,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub modified_at: Option<OffsetDateTime>,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieves `url`. When `if_modified_since` is set the request is
    /// conditional and may come back with `not_modified`.
    async fn fetch(
        &self,
        url: &str,
        if_modified_since: Option<OffsetDateTime>,
        timeout: Duration,
    ) -> Result<FetchResponse, FetchError>;

    /// Headers-only freshness check.
    async fn probe(&self, url: &str, timeout: Duration) -> Result<ProbeResponse, FetchError>;
}

/// Parses an HTTP date such as `Wed, 21 Oct 2015 07:28:00 GMT`.
pub fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    let value = value.trim();
    if let Ok(dt) = OffsetDateTime::parse(value, &Rfc2822) {
        return Some(dt.to_offset(UtcOffset::UTC));
    }
    let fmt = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    PrimitiveDateTime::parse(value, &fmt).ok().map(PrimitiveDateTime::assume_utc)
}

/// Formats a timestamp for `If-Modified-Since`. Sub-second precision is dropped.
pub fn format_http_date(at: OffsetDateTime) -> String {
    let fmt = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    at.to_offset(UtcOffset::UTC).format(&fmt).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn parses_http_dates() {
        let dt = parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
        assert_eq!(dt, datetime!(2015-10-21 07:28:00 UTC));
        assert!(parse_http_date("yesterday-ish").is_none());
    }

    #[test]
    fn http_date_round_trips_at_second_precision() {
        let at = datetime!(2015-10-21 07:28:00 UTC);
        assert_eq!(format_http_date(at), "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_http_date(&format_http_date(at)), Some(at));
    }
}
