use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sha1::{Digest, Sha1};
use sift_core::report::{top_keywords, write_report, REPORT_KEYWORDS};
use sift_core::{Analyzer, DataPaths, Fetcher, Store};
use sift_crawler::parser::norm;
use sift_crawler::{is_corpus_valid, CrawlOptions, Crawler, HttpFetcher, DEFAULT_USER_AGENT};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Incrementally crawl a site into the corpus store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl breadth-first from a start URL, reusing the stored corpus where pages are unchanged
    Crawl {
        start_url: String,
        /// Maximum number of pages to keep
        #[arg(long, default_value_t = 30)]
        max_pages: usize,
        /// Data directory holding the corpus and index stores
        #[arg(long, default_value = "./data")]
        data: PathBuf,
        /// Newline-delimited stopword list (built-in English list when omitted)
        #[arg(long)]
        stopwords: Option<PathBuf>,
        /// Concurrency (number of workers)
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
        /// Per-request timeout seconds
        #[arg(long, default_value_t = 5)]
        timeout_secs: u64,
        /// Overall crawl deadline in seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
        /// Only follow links that stay on the start URL's host
        #[arg(long, default_value_t = false)]
        same_host_only: bool,
        #[arg(long, default_value = DEFAULT_USER_AGENT)]
        user_agent: String,
        /// Ignore the stored corpus and crawl from scratch
        #[arg(long, default_value_t = false)]
        fresh: bool,
    },
    /// Report whether the stored corpus is still fresh for a start URL
    Check {
        start_url: String,
        #[arg(long, default_value = "./data")]
        data: PathBuf,
        #[arg(long, default_value_t = 5)]
        timeout_secs: u64,
        #[arg(long, default_value = DEFAULT_USER_AGENT)]
        user_agent: String,
    },
    /// Write a human-readable summary of the stored corpus
    Report {
        #[arg(long, default_value = "./data")]
        data: PathBuf,
        #[arg(long)]
        stopwords: Option<PathBuf>,
        #[arg(long, default_value = "spider_result.txt")]
        output: PathBuf,
    },
    /// Export the stored corpus as JSONL
    Export {
        #[arg(long, default_value = "./data")]
        data: PathBuf,
        #[arg(long)]
        stopwords: Option<PathBuf>,
        #[arg(long, default_value = "./data/corpus.jsonl")]
        output: PathBuf,
    },
}

#[derive(Serialize)]
struct OutDoc<'a> {
    id: String,
    title: &'a str,
    url: &'a str,
    last_modified: String,
    size_bytes: u64,
    keywords: Vec<(String, u32)>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl {
            start_url,
            max_pages,
            data,
            stopwords,
            concurrency,
            timeout_secs,
            deadline_secs,
            same_host_only,
            user_agent,
            fresh,
        } => {
            let options = CrawlOptions {
                concurrency,
                fetch_timeout: Duration::from_secs(timeout_secs),
                deadline: deadline_secs.map(Duration::from_secs),
                same_host_only,
            };
            let analyzer = Analyzer::from_stopword_file(stopwords.as_deref());
            fs::create_dir_all(&data)?;
            let store = Store::open(&DataPaths::new(data))?;
            crawl(&start_url, max_pages, &store, analyzer, &user_agent, options, fresh).await
        }
        Commands::Check { start_url, data, timeout_secs, user_agent } => {
            let store = Store::open(&DataPaths::new(data))?;
            check(&start_url, &store, &user_agent, Duration::from_secs(timeout_secs)).await
        }
        Commands::Report { data, stopwords, output } => {
            let store = Store::open(&DataPaths::new(data))?;
            report(&store, &Analyzer::from_stopword_file(stopwords.as_deref()), &output)
        }
        Commands::Export { data, stopwords, output } => {
            let store = Store::open(&DataPaths::new(data))?;
            export(&store, &Analyzer::from_stopword_file(stopwords.as_deref()), &output)
        }
    }
}

fn canonical(start_url: &str) -> Result<String> {
    let u = Url::parse(start_url).with_context(|| format!("invalid start url {start_url}"))?;
    Ok(norm(&u))
}

async fn crawl(
    start_url: &str,
    max_pages: usize,
    store: &Store,
    analyzer: Analyzer,
    user_agent: &str,
    options: CrawlOptions,
    fresh: bool,
) -> Result<()> {
    let start_url = canonical(start_url)?;
    let prior = if fresh {
        None
    } else {
        match store.load_corpus() {
            Ok(prior) => prior.filter(|(corpus, _)| corpus.start_url() == start_url),
            Err(e) => {
                tracing::warn!(error = %e, "could not read stored corpus, crawling from scratch");
                None
            }
        }
    };
    if let Some((corpus, meta)) = &prior {
        tracing::info!(pages = corpus.len(), created_at = %meta.created_at, "reusing stored corpus");
    }

    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(user_agent)?);
    let crawler = Crawler::new(fetcher, Arc::new(analyzer), options);
    let corpus = crawler.crawl(&start_url, max_pages, prior.as_ref().map(|(c, _)| c)).await?;
    let meta = store.save_corpus(&corpus, max_pages)?;
    tracing::info!(pages = meta.num_docs, root = %store.root().display(), "corpus saved");
    Ok(())
}

async fn check(start_url: &str, store: &Store, user_agent: &str, timeout: Duration) -> Result<()> {
    let start_url = canonical(start_url)?;
    let Some((corpus, meta)) = store.load_corpus()? else {
        println!("absent");
        return Ok(());
    };
    let fetcher = HttpFetcher::new(user_agent)?;
    let valid = is_corpus_valid(&fetcher, &start_url, corpus.start_page(), meta.age(), timeout).await;
    println!("{}", if valid { "valid" } else { "stale" });
    Ok(())
}

fn report(store: &Store, analyzer: &Analyzer, output: &Path) -> Result<()> {
    let (corpus, _) = store.load_corpus()?.ok_or_else(|| anyhow!("no corpus under {}", store.root().display()))?;
    let mut out = BufWriter::new(File::create(output)?);
    write_report(&corpus, analyzer, &mut out)?;
    out.flush()?;
    tracing::info!(pages = corpus.len(), output = %output.display(), "report written");
    Ok(())
}

fn export(store: &Store, analyzer: &Analyzer, output: &Path) -> Result<()> {
    let (corpus, _) = store.load_corpus()?.ok_or_else(|| anyhow!("no corpus under {}", store.root().display()))?;
    if let Some(dir) = output.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut out = BufWriter::new(File::create(output)?);
    for page in corpus.pages() {
        let mut hasher = Sha1::new();
        hasher.update(page.url.as_bytes());
        let rec = OutDoc {
            id: format!("{:x}", hasher.finalize()),
            title: &page.title,
            url: &page.url,
            last_modified: page.last_modified.format(&Rfc3339).unwrap_or_default(),
            size_bytes: page.size_bytes,
            keywords: top_keywords(page, analyzer, REPORT_KEYWORDS),
        };
        serde_json::to_writer(&mut out, &rec)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    tracing::info!(pages = corpus.len(), output = %output.display(), "corpus exported");
    Ok(())
}
