use sift_core::Analyzer;
use std::collections::BTreeMap;

/// A query split into ordinary terms and quoted phrases.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    /// Stemmed, stopword-filtered words outside quotes, repeats kept.
    pub terms: Vec<String>,
    /// Each quoted phrase as its stemmed words in order. Stopwords are kept.
    pub phrases: Vec<Vec<String>>,
}

impl ParsedQuery {
    /// Scans left to right for `"..."` pairs. An opening quote with no
    /// closing partner drops everything after it.
    pub fn parse(query: &str, analyzer: &Analyzer) -> Self {
        let mut outside = String::new();
        let mut phrases = Vec::new();
        let mut rest = query;
        while let Some(open) = rest.find('"') {
            outside.push_str(&rest[..open]);
            outside.push(' ');
            let quoted = &rest[open + 1..];
            let Some(close) = quoted.find('"') else {
                rest = "";
                break;
            };
            let tokens: Vec<String> = analyzer.words(&quoted[..close]).iter().map(|w| analyzer.stem(w)).collect();
            if !tokens.is_empty() {
                phrases.push(tokens);
            }
            rest = &quoted[close + 1..];
        }
        outside.push_str(rest);
        let terms = analyzer.tokenize(&outside).into_iter().map(|(stem, _)| stem).collect();
        Self { terms, phrases }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.phrases.is_empty()
    }

    /// Raw query weights: 1 per occurrence of an ordinary term, plus
    /// `phrase_weight` per phrase occurrence of a token that is not also an
    /// ordinary term.
    pub fn weighted_terms(&self, phrase_weight: f64) -> BTreeMap<String, f64> {
        let mut weights: BTreeMap<String, f64> = BTreeMap::new();
        for term in &self.terms {
            *weights.entry(term.clone()).or_insert(0.0) += 1.0;
        }
        for token in self.phrases.iter().flatten() {
            if self.terms.contains(token) {
                continue;
            }
            *weights.entry(token.clone()).or_insert(0.0) += phrase_weight;
        }
        weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(q: &str) -> ParsedQuery {
        ParsedQuery::parse(q, &Analyzer::default())
    }

    fn strings(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn splits_phrases_from_terms() {
        let q = parse(r#"rust "Quick Foxes" crawlers"#);
        assert_eq!(q.terms, strings(&["rust", "crawler"]));
        assert_eq!(q.phrases, vec![strings(&["quick", "fox"])]);
    }

    #[test]
    fn phrases_keep_stopwords_terms_drop_them() {
        let q = parse(r#"the cat "the hat""#);
        assert_eq!(q.terms, strings(&["cat"]));
        assert_eq!(q.phrases, vec![strings(&["the", "hat"])]);
    }

    #[test]
    fn unterminated_quote_discards_the_rest() {
        let q = parse(r#"fox "quick brown dogs"#);
        assert_eq!(q.terms, strings(&["fox"]));
        assert!(q.phrases.is_empty());

        let q = parse(r#""a b" c "d"#);
        assert_eq!(q.phrases, vec![strings(&["a", "b"])]);
        assert_eq!(q.terms, strings(&["c"]));
    }

    #[test]
    fn empty_queries_parse_to_nothing() {
        for q in ["", "   ", r#""""#, "the of and", r#""  ""#] {
            assert!(parse(q).is_empty(), "{q:?}");
        }
    }

    #[test]
    fn phrase_tokens_add_half_unless_already_terms() {
        let q = parse(r#"fox fox "quick fox" "quick""#);
        let w = q.weighted_terms(0.5);
        assert_eq!(w.get("fox"), Some(&2.0));
        assert_eq!(w.get("quick"), Some(&1.0));
        assert_eq!(w.len(), 2);
    }
}
