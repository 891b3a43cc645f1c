use criterion::{criterion_group, criterion_main, Criterion};
use sift_core::tokenizer::Analyzer;

const TEXT: &str = "The crawler walks the site breadth first, records every page it reaches \
and keeps the link graph consistent as pages change. Each body is split into words, \
stopwords are dropped, and runs of two to five words are counted as phrases.";

fn bench_tokenize(c: &mut Criterion) {
    let analyzer = Analyzer::default();
    c.bench_function("tokenize_paragraph", |b| b.iter(|| analyzer.tokenize(TEXT)));
    c.bench_function("body_keywords_paragraph", |b| b.iter(|| analyzer.body_keywords(TEXT)));
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
