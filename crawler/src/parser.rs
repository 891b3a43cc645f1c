//! HTML extraction: title, visible body text and anchor targets.

use scraper::{Html, Selector};
use url::Url;

#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub title: Option<String>,
    /// Text nodes under `<body>`, excluding script and style contents,
    /// joined by single spaces.
    pub body_text: String,
    /// Absolute http(s) targets in document order, fragments stripped.
    pub links: Vec<String>,
}

/// Parsing is best-effort: malformed markup still yields whatever the
/// parser recovered, possibly an empty page.
pub fn parse_html(bytes: &[u8], base: &Url) -> ParsedPage {
    let html = String::from_utf8_lossy(bytes);
    let doc = Html::parse_document(&html);
    ParsedPage {
        title: extract_title(&doc),
        body_text: visible_body_text(&doc),
        links: anchor_hrefs(&doc).iter().filter_map(|h| resolve(base, h)).collect(),
    }
}

fn extract_title(doc: &Html) -> Option<String> {
    let sel = Selector::parse("title").ok()?;
    doc.select(&sel)
        .next()
        .map(|n| n.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn visible_body_text(doc: &Html) -> String {
    let Ok(sel) = Selector::parse("body") else {
        return String::new();
    };
    let Some(body) = doc.select(&sel).next() else {
        return String::new();
    };
    let mut parts: Vec<&str> = Vec::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element())
            .map_or(false, |e| matches!(e.name(), "script" | "style"));
        if !hidden {
            parts.push(&**text);
        }
    }
    parts.join(" ")
}

fn anchor_hrefs(doc: &Html) -> Vec<String> {
    let Ok(sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    doc.select(&sel)
        .filter_map(|a| a.value().attr("href"))
        .map(|h| h.trim().to_string())
        .collect()
}

/// Resolves `href` against `base`. Non-http(s) targets yield `None`.
pub fn resolve(base: &Url, href: &str) -> Option<String> {
    let u = Url::parse(href).or_else(|_| base.join(href)).ok()?;
    if !u.scheme().starts_with("http") {
        return None;
    }
    Some(norm(&u))
}

/// Canonical string form used as the page key.
pub fn norm(u: &Url) -> String {
    let mut s = u.clone();
    s.set_fragment(None);
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title> Test Page </title>
        <style>body { color: red }</style></head>
        <body><h1>Hello</h1><script>var hidden = 1;</script>
        <p>visible <b>text</b></p>
        <a href="/about#team">About</a>
        <a href="https://other.test/x">Other</a>
        <a href="mailto:someone@site.test">Mail</a>
        <a href="javascript:void(0)">Nothing</a>
        </body></html>"#;

    #[test]
    fn extracts_title_text_and_links() {
        let base = Url::parse("http://site.test/dir/index.html").unwrap();
        let parsed = parse_html(PAGE.as_bytes(), &base);
        assert_eq!(parsed.title.as_deref(), Some("Test Page"));
        assert!(parsed.body_text.contains("Hello"));
        assert!(parsed.body_text.contains("visible"));
        assert!(parsed.body_text.contains("text"));
        assert!(!parsed.body_text.contains("hidden"));
        assert!(!parsed.body_text.contains("color"));
        assert_eq!(parsed.links, vec!["http://site.test/about", "https://other.test/x"]);
    }

    #[test]
    fn missing_title_and_garbage_are_tolerated() {
        let base = Url::parse("http://site.test/").unwrap();
        let parsed = parse_html(b"\xff\xfe<p>just text", &base);
        assert!(parsed.title.is_none());
        assert!(parsed.body_text.contains("just text"));
        assert!(parsed.links.is_empty());
    }

    #[test]
    fn resolves_relative_links() {
        let base = Url::parse("http://site.test/a/b.html").unwrap();
        assert_eq!(resolve(&base, "c.html").as_deref(), Some("http://site.test/a/c.html"));
        assert_eq!(resolve(&base, "../d").as_deref(), Some("http://site.test/d"));
        assert_eq!(resolve(&base, "ftp://x.test/f"), None);
    }
}
