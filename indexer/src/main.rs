use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sift_core::{Analyzer, DataPaths, Posting, Store};
use sift_indexer::build_indices;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and inspect the body and title TF-IDF indices", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Field {
    Body,
    Title,
}

#[derive(Subcommand)]
enum Commands {
    /// Build both indices from the stored corpus
    Build {
        /// Data directory holding the corpus and index stores
        #[arg(long, default_value = "./data")]
        data: PathBuf,
        /// Newline-delimited stopword list (built-in English list when omitted)
        #[arg(long)]
        stopwords: Option<PathBuf>,
    },
    /// Print the postings of one term as JSON
    Inspect {
        /// Term or quoted phrase; stemmed before lookup
        term: String,
        #[arg(long, value_enum, default_value_t = Field::Body)]
        field: Field,
        #[arg(long, default_value = "./data")]
        data: PathBuf,
    },
}

#[derive(Serialize)]
struct TermReport<'a> {
    term: String,
    df: usize,
    postings: &'a [Posting],
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { data, stopwords } => {
            build(&Store::open(&DataPaths::new(data))?, &Analyzer::from_stopword_file(stopwords.as_deref()))
        }
        Commands::Inspect { term, field, data } => inspect(&Store::open(&DataPaths::new(data))?, &term, field),
    }
}

fn build(store: &Store, analyzer: &Analyzer) -> Result<()> {
    let (corpus, corpus_meta) =
        store.load_corpus()?.ok_or_else(|| anyhow!("no corpus under {}; run the crawler first", store.root().display()))?;
    let (body, title) = build_indices(&corpus, analyzer);
    let meta = store.save_indices(&body, &title, &corpus_meta)?;
    tracing::info!(num_docs = meta.num_docs, root = %store.root().display(), "index build complete");
    Ok(())
}

fn inspect(store: &Store, term: &str, field: Field) -> Result<()> {
    let (body, title, _) =
        store.load_indices()?.ok_or_else(|| anyhow!("no index under {}; run `indexer build`", store.root().display()))?;
    let index = match field {
        Field::Body => &body,
        Field::Title => &title,
    };
    let analyzer = Analyzer::default();
    let key = analyzer.stem_phrase(&analyzer.words(term).join(" "));
    let postings: &[Posting] = index.get(&key).unwrap_or(&[]);
    let report = TermReport { term: key, df: postings.len(), postings };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
