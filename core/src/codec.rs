//! Row encoding for the on-disk tables.
//!
//! Every string field is percent-escaped before it is joined, so `,` and `:`
//! inside titles, terms or URLs never collide with the separators.

use crate::index::Posting;
use crate::page::Page;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid escape sequence in {0:?}")]
    Escape(String),

    #[error("malformed {field} entry {value:?}")]
    Field { field: &'static str, value: String },

    #[error("invalid timestamp: {0}")]
    Timestamp(String),
}

pub fn escape(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

pub fn unescape(s: &str) -> Result<String, CodecError> {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .map_err(|_| CodecError::Escape(s.to_string()))
}

pub fn encode_links(links: &BTreeSet<String>) -> String {
    links.iter().map(|l| escape(l)).collect::<Vec<_>>().join(",")
}

pub fn decode_links(s: &str) -> Result<BTreeSet<String>, CodecError> {
    if s.is_empty() {
        return Ok(BTreeSet::new());
    }
    s.split(',').map(unescape).collect()
}

/// `term:freq,term:freq,...`
pub fn encode_keywords(keywords: &BTreeMap<String, u32>) -> String {
    keywords
        .iter()
        .map(|(term, freq)| format!("{}:{}", escape(term), freq))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn decode_keywords(s: &str) -> Result<BTreeMap<String, u32>, CodecError> {
    let mut out = BTreeMap::new();
    if s.is_empty() {
        return Ok(out);
    }
    for item in s.split(',') {
        let malformed = || CodecError::Field { field: "keyword", value: item.to_string() };
        let (term, freq) = item.split_once(':').ok_or_else(malformed)?;
        let freq: u32 = freq.parse().map_err(|_| malformed())?;
        out.insert(unescape(term)?, freq);
    }
    Ok(out)
}

/// `url:tf:tfidf,...`
pub fn encode_postings(postings: &[Posting]) -> String {
    postings
        .iter()
        .map(|p| format!("{}:{}:{}", escape(&p.url), p.tf, p.tf_idf))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn decode_postings(s: &str) -> Result<Vec<Posting>, CodecError> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.split(',')
        .map(|item| {
            let malformed = || CodecError::Field { field: "posting", value: item.to_string() };
            let mut parts = item.split(':');
            let (Some(url), Some(tf), Some(tf_idf), None) = (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(malformed());
            };
            Ok(Posting {
                url: unescape(url)?,
                tf: tf.parse().map_err(|_| malformed())?,
                tf_idf: tf_idf.parse().map_err(|_| malformed())?,
            })
        })
        .collect()
}

pub fn encode_timestamp(at: OffsetDateTime) -> Result<String, CodecError> {
    at.format(&Rfc3339).map_err(|e| CodecError::Timestamp(e.to_string()))
}

pub fn decode_timestamp(s: &str) -> Result<OffsetDateTime, CodecError> {
    OffsetDateTime::parse(s, &Rfc3339).map_err(|e| CodecError::Timestamp(e.to_string()))
}

/// One row of the `pages` table; the URL is the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRow {
    pub title: String,
    pub last_modified: String,
    pub size_bytes: u64,
    pub body_keywords: String,
    pub parent_links: String,
    pub child_links: String,
    pub is_start: bool,
}

impl PageRow {
    pub fn from_page(page: &Page, is_start: bool) -> Result<Self, CodecError> {
        Ok(Self {
            title: escape(&page.title),
            last_modified: encode_timestamp(page.last_modified)?,
            size_bytes: page.size_bytes,
            body_keywords: encode_keywords(&page.body_keywords),
            parent_links: encode_links(&page.parent_links),
            child_links: encode_links(&page.child_links),
            is_start,
        })
    }

    pub fn into_page(self, url: String) -> Result<Page, CodecError> {
        Ok(Page {
            url,
            title: unescape(&self.title)?,
            last_modified: decode_timestamp(&self.last_modified)?,
            size_bytes: self.size_bytes,
            body_keywords: decode_keywords(&self.body_keywords)?,
            parent_links: decode_links(&self.parent_links)?,
            child_links: decode_links(&self.child_links)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_inside_fields_survive() {
        let mut kw = BTreeMap::new();
        kw.insert("a:b, c".to_string(), 3);
        kw.insert("plain".to_string(), 1);
        let encoded = encode_keywords(&kw);
        assert_eq!(encoded.matches(',').count(), 1);
        assert_eq!(decode_keywords(&encoded).unwrap(), kw);

        let links: BTreeSet<String> =
            ["http://a.test/x?q=1,2".to_string(), "http://a.test:8080/".to_string()].into();
        assert_eq!(decode_links(&encode_links(&links)).unwrap(), links);
    }

    #[test]
    fn postings_keep_full_precision() {
        let postings = vec![
            Posting { url: "http://a.test:81/p".into(), tf: 4, tf_idf: 4.0 * (5.0f64 / 3.0).ln() },
            Posting { url: "http://b.test/".into(), tf: 1, tf_idf: -0.2876820724517809 },
        ];
        assert_eq!(decode_postings(&encode_postings(&postings)).unwrap(), postings);
    }

    #[test]
    fn rejects_malformed_rows() {
        assert!(decode_keywords("novalue").is_err());
        assert!(decode_postings("u:1").is_err());
        assert!(decode_postings("u:x:1.0").is_err());
        assert!(decode_links("%E0%A4%A").is_err());
    }
}
