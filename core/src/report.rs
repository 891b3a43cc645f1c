use crate::page::Corpus;
use crate::tokenizer::Analyzer;
use std::collections::BTreeMap;
use std::io::{self, Write};
use time::format_description::well_known::Rfc3339;

pub const REPORT_KEYWORDS: usize = 10;
pub const REPORT_CHILD_LINKS: usize = 10;
pub const REPORT_SEPARATOR: &str = "——————————————–";

/// Body keywords merged with stopword-filtered title words, most frequent
/// first, ties broken alphabetically.
pub fn top_keywords(page: &crate::Page, analyzer: &Analyzer, limit: usize) -> Vec<(String, u32)> {
    let mut combined: BTreeMap<String, u32> = page.body_keywords.clone();
    for word in analyzer.filtered_words(&page.title) {
        *combined.entry(word).or_insert(0) += 1;
    }
    let mut ranked: Vec<(String, u32)> = combined.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

/// Human-readable summary of a crawl, one block per page in URL order:
/// title, URL, date and size, top keywords, then up to ten child links.
pub fn write_report<W: Write>(corpus: &Corpus, analyzer: &Analyzer, out: &mut W) -> io::Result<()> {
    let total = corpus.len();
    for (i, page) in corpus.pages().enumerate() {
        writeln!(out, "{}", page.title)?;
        writeln!(out, "{}", page.url)?;
        let date = page.last_modified.format(&Rfc3339).unwrap_or_default();
        writeln!(out, "{}, {} bytes", date, page.size_bytes)?;
        let keywords = top_keywords(page, analyzer, REPORT_KEYWORDS)
            .into_iter()
            .map(|(k, v)| format!("{k} {v}"))
            .collect::<Vec<_>>()
            .join("; ");
        writeln!(out, "{keywords}")?;
        for child in page.child_links.iter().take(REPORT_CHILD_LINKS) {
            writeln!(out, "{child}")?;
        }
        if i + 1 < total {
            writeln!(out, "{REPORT_SEPARATOR}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Page;

    fn page(url: &str, title: &str, body: &str, children: usize) -> Page {
        let analyzer = Analyzer::default();
        let mut p = Page::stub(url);
        p.title = title.to_string();
        p.size_bytes = body.len() as u64;
        p.body_keywords = analyzer.body_keywords(body);
        p.child_links = (0..children).map(|i| format!("{url}c{i:02}")).collect();
        p
    }

    #[test]
    fn report_lists_each_page_with_separator() {
        let corpus = Corpus::from_pages(
            "http://a.test/",
            vec![
                page("http://a.test/", "Home Page", "rust rust crawler", 12),
                page("http://a.test/b", "Other", "index", 0),
            ],
        )
        .unwrap();
        let mut buf = Vec::new();
        write_report(&corpus, &Analyzer::default(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Home Page");
        assert_eq!(lines[1], "http://a.test/");
        assert!(lines[2].ends_with(", 17 bytes"));
        assert!(lines[3].starts_with("rust 2; "));
        assert_eq!(text.matches(REPORT_SEPARATOR).count(), 1);
        assert_eq!(lines.iter().filter(|l| l.starts_with("http://a.test/c")).count(), REPORT_CHILD_LINKS);
        assert_eq!(lines.last(), Some(&"index 1"));
    }

    #[test]
    fn title_words_count_towards_keywords() {
        let p = page("http://a.test/", "Crawler", "crawler", 0);
        let top = top_keywords(&p, &Analyzer::default(), 3);
        assert_eq!(top[0], ("crawler".to_string(), 2));
    }
}
