use sift_core::{Analyzer, Corpus, DataPaths, Page, Store};
use sift_indexer::build_indices;

fn corpus(analyzer: &Analyzer) -> Corpus {
    let pages = [
        ("http://site.test/", "Search Engines", "crawlers feed the index: crawl, parse, rank"),
        ("http://site.test/b", "Ranking", "cosine ranking, phrase boosts"),
        ("http://site.test/c", "Parsing", "parse html and extract links"),
    ]
    .into_iter()
    .map(|(url, title, body)| {
        let mut p = Page::stub(url);
        p.title = title.to_string();
        p.body_keywords = analyzer.body_keywords(body);
        p
    });
    Corpus::from_pages("http://site.test/", pages).unwrap()
}

#[test]
fn indices_survive_a_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&DataPaths::new(dir.path())).unwrap();
    let analyzer = Analyzer::default();
    store.save_corpus(&corpus(&analyzer), 30).unwrap();

    let (stored, corpus_meta) = store.load_corpus().unwrap().unwrap();
    let (body, title) = build_indices(&stored, &analyzer);
    let meta = store.save_indices(&body, &title, &corpus_meta).unwrap();
    assert_eq!(meta.corpus_created_at, corpus_meta.created_at);
    assert_eq!(meta.num_docs, 3);

    let (body2, title2, meta2) = store.load_indices().unwrap().unwrap();
    assert_eq!(body2, body);
    assert_eq!(title2, title);
    assert_eq!(meta2, meta);
    assert_eq!(body2.get("pars").map(|p| p.len()), Some(2));
    assert_eq!(title2.get("rank").map(|p| p.len()), Some(1));
}

#[test]
fn rebuilding_repeatedly_on_one_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&DataPaths::new(dir.path())).unwrap();
    let analyzer = Analyzer::default();
    for _ in 0..20 {
        store.save_corpus(&corpus(&analyzer), 30).unwrap();
        let (stored, corpus_meta) = store.load_corpus().unwrap().unwrap();
        let (body, title) = build_indices(&stored, &analyzer);
        store.save_indices(&body, &title, &corpus_meta).unwrap();
        let (body2, _, meta2) = store.load_indices().unwrap().unwrap();
        assert_eq!(body2, body);
        assert_eq!(meta2.corpus_created_at, corpus_meta.created_at);
    }
}
