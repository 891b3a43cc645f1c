use anyhow::Result;
use axum::Router;
use clap::Parser;
use sift_core::{Analyzer, DataPaths, Fetcher, Store};
use sift_crawler::{CrawlOptions, HttpFetcher, DEFAULT_USER_AGENT};
use sift_server::pipeline::SearchEngine;
use sift_server::retrieval::RankingWeights;
use sift_server::{build_app, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Data directory holding the corpus and index stores
    #[arg(long, default_value = "./data")]
    data: PathBuf,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Start URL used when a search request does not name one
    #[arg(long)]
    start_url: Option<String>,
    /// Page cap used when a search request does not name one
    #[arg(long, default_value_t = 30)]
    max_pages: usize,
    /// Newline-delimited stopword list (built-in English list when omitted)
    #[arg(long)]
    stopwords: Option<PathBuf>,
    #[arg(long, default_value_t = 4)]
    concurrency: usize,
    /// Per-request timeout seconds
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,
    /// Overall crawl deadline in seconds
    #[arg(long)]
    deadline_secs: Option<u64>,
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    user_agent: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&args.user_agent)?);
    let options = CrawlOptions {
        concurrency: args.concurrency,
        fetch_timeout: Duration::from_secs(args.timeout_secs),
        deadline: args.deadline_secs.map(Duration::from_secs),
        same_host_only: false,
    };
    std::fs::create_dir_all(&args.data)?;
    let store = Store::open(&DataPaths::new(&args.data))?;
    let engine = SearchEngine::new(
        store,
        Arc::new(Analyzer::from_stopword_file(args.stopwords.as_deref())),
        fetcher,
        options,
        RankingWeights::default(),
    );
    let state = AppState {
        engine: Arc::new(engine),
        default_start_url: args.start_url.clone(),
        default_max_pages: args.max_pages,
    };
    let app: Router = build_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, data = %args.data.display(), "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
