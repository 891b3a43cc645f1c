use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

/// Shortest and longest contiguous word runs recorded as phrases.
pub const MIN_PHRASE_WORDS: usize = 2;
pub const MAX_PHRASE_WORDS: usize = 5;

lazy_static! {
    static ref RE: Regex = Regex::new(r"\w+(?:'\w+)*").expect("valid regex");
    static ref ENGLISH: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Words dropped before counting single-word keywords.
#[derive(Debug, Clone, Default)]
pub struct Stopwords(HashSet<String>);

impl Stopwords {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in English list.
    pub fn english() -> Self {
        Self(ENGLISH.iter().map(|w| w.to_string()).collect())
    }

    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        )
    }

    /// Newline-delimited word list. A missing or unreadable file yields the
    /// empty set, which disables filtering.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(text) => Self::from_words(text.lines()),
            Err(e) => {
                tracing::debug!(path = %path.as_ref().display(), error = %e, "stopword file unavailable, filtering disabled");
                Self::empty()
            }
        }
    }

    pub fn contains(&self, word: &str) -> bool {
        self.0.contains(word)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Stopword filtering, word splitting and stemming. The same instance must be
/// used to build an index and to query it.
pub struct Analyzer {
    stopwords: Stopwords,
    stemmer: Stemmer,
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer").field("stopwords", &self.stopwords.len()).finish()
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(Stopwords::english())
    }
}

impl Analyzer {
    pub fn new(stopwords: Stopwords) -> Self {
        Self { stopwords, stemmer: Stemmer::create(Algorithm::English) }
    }

    /// Reads the stopword list from `path` when given, otherwise uses the
    /// built-in English list.
    pub fn from_stopword_file(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self::new(Stopwords::load(p)),
            None => Self::default(),
        }
    }

    pub fn stopwords(&self) -> &Stopwords {
        &self.stopwords
    }

    /// NFKC-normalized, lowercased word tokens with nothing removed. An
    /// apostrophe between word characters stays inside the token.
    pub fn words(&self, text: &str) -> Vec<String> {
        let normalized = text.nfkc().collect::<String>().to_lowercase().replace('\u{2019}', "'");
        RE.find_iter(&normalized).map(|m| m.as_str().to_string()).collect()
    }

    /// Words with stopwords removed, not stemmed.
    pub fn filtered_words(&self, text: &str) -> Vec<String> {
        self.words(text).into_iter().filter(|w| !self.stopwords.contains(w)).collect()
    }

    /// Tokenize text into (stem, position) with stopword removal. Positions
    /// count removed words too.
    pub fn tokenize(&self, text: &str) -> Vec<(String, usize)> {
        self.words(text)
            .into_iter()
            .enumerate()
            .filter(|(_, w)| !self.stopwords.contains(w))
            .map(|(pos, w)| (self.stem(&w), pos))
            .collect()
    }

    pub fn stem(&self, word: &str) -> String {
        self.stemmer.stem(word).into_owned()
    }

    /// Stems every space-separated word of a keyword independently.
    pub fn stem_phrase(&self, term: &str) -> String {
        term.split(' ')
            .filter(|w| !w.is_empty())
            .map(|w| self.stem(w))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Unstemmed keyword counts for a page body: stopword-filtered single
    /// words plus 2..=5 word phrases over the unfiltered word sequence.
    pub fn body_keywords(&self, text: &str) -> BTreeMap<String, u32> {
        let words = self.words(text);
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for w in words.iter().filter(|w| !self.stopwords.contains(w)) {
            *counts.entry(w.clone()).or_insert(0) += 1;
        }
        for phrase in phrases(&words) {
            *counts.entry(phrase).or_insert(0) += 1;
        }
        counts
    }

    /// Stemmed term counts for a title: filtered single-word stems plus
    /// phrases regenerated from the raw title with each word stemmed.
    pub fn title_terms(&self, title: &str) -> BTreeMap<String, u32> {
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for (stem, _) in self.tokenize(title) {
            *counts.entry(stem).or_insert(0) += 1;
        }
        for phrase in phrases(&self.words(title)) {
            *counts.entry(self.stem_phrase(&phrase)).or_insert(0) += 1;
        }
        counts
    }
}

/// Every contiguous run of 2 to 5 words, joined by single spaces.
pub fn phrases(words: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for n in MIN_PHRASE_WORDS..=MAX_PHRASE_WORDS.min(words.len()) {
        for window in words.windows(n) {
            out.push(window.join(" "));
        }
    }
    out
}
