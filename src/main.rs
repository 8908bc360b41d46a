//! # Topic Digest
//!
//! A news ingestion pipeline that pulls articles from many independently run
//! RSS/Atom feeds, summarizes them extractively, and keeps one bounded,
//! deduplicated dataset per topic in a blob store, plus a derived aggregate.
//!
//! ## Features
//!
//! - Fetches RSS and Atom feeds per topic with per-source timeouts; a broken
//!   source contributes nothing instead of failing its topic
//! - Extracts body text and a cover image from each article's landing page,
//!   with bounded retry that never retries 401/403
//! - Summarizes with a deterministic sentence-scoring extractive summarizer
//! - Guarantees one URL lands in at most one topic per run
//! - Merges into the previously published dataset (latest copy wins), then
//!   applies optional retention and a size cap before a verified write
//!
//! ## Usage
//!
//! ```sh
//! topic_digest run --store-dir ./store
//! topic_digest page --category technology --page 1 --limit 20 --store-dir ./store
//! ```
//!
//! ## Architecture
//!
//! A run is a sequence of topic stages:
//! 1. **Fetching**: Download and parse every feed of the topic
//! 2. **Claiming**: Drop URLs seen earlier in the topic or claimed by an earlier topic
//! 3. **Processing**: Extract and summarize in fixed-size concurrent batches
//! 4. **Publishing**: Read, merge, write and verify the topic's dataset
//!
//! followed by a rebuild of the aggregate dataset from the published topics.

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod catalog;
mod classifier;
mod cli;
mod config;
mod error;
mod extractor;
mod feeds;
mod http;
mod merge;
mod models;
mod pipeline;
mod processor;
mod publish;
mod retry;
mod serve;
mod store;
mod summarizer;
mod utils;

use cli::{Cli, Command};
use config::PipelineConfig;
use http::ReqwestClient;
use pipeline::{CancelFlag, run_pipeline};
use store::FsBlobStore;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "topic_digest starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.command, "Parsed CLI arguments");

    match args.command {
        Command::Run {
            config,
            store_dir,
            report,
        } => run(config.as_deref(), &store_dir, report.as_deref()).await?,
        Command::Page {
            category,
            page,
            limit,
            store_dir,
        } => print_page(&category, page, limit, &store_dir).await?,
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

/// One pipeline run: load config, run every topic, print the report.
#[instrument(level = "info", skip_all, fields(store_dir = %store_dir.display()))]
async fn run(
    config_path: Option<&Path>,
    store_dir: &Path,
    report_path: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let config = PipelineConfig::load(config_path)?;
    let catalog = config.catalog()?;
    info!(
        topics = catalog.topics().len(),
        sources = catalog.topics().iter().map(|t| t.sources.len()).sum::<usize>(),
        "Loaded catalog"
    );

    // Early check: ensure the store dir is writable
    if let Err(e) = ensure_writable_dir(store_dir).await {
        error!(
            path = %store_dir.display(),
            error = %e,
            "Store directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }
    let store = FsBlobStore::new(store_dir);
    let client = ReqwestClient::new(&config.user_agent)?;

    // Ctrl-C stops the run at the next topic or batch boundary.
    let cancel = CancelFlag::default();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping at the next batch boundary");
            watcher.cancel();
        }
    });

    let report = run_pipeline(&config, &catalog, &client, &store, &cancel, Utc::now()).await;
    let json = serde_json::to_string_pretty(&report)?;

    if let Some(path) = report_path {
        tokio::fs::write(path, &json).await?;
        info!(path = %path.display(), "Wrote run report");
    }
    if !report.success {
        warn!(
            failed = report.summary.failed,
            store = %store.root().display(),
            "Run finished with failed topics"
        );
    }
    println!("{json}");
    Ok(())
}

/// Print one shuffled page of a published dataset as JSON.
#[instrument(level = "info", skip(store_dir))]
async fn print_page(category: &str, page: usize, limit: usize, store_dir: &Path) -> Result<(), Box<dyn Error>> {
    let store = FsBlobStore::new(store_dir);
    let mut rng = rand::rng();
    match serve::load_page(&store, category, page, limit, &mut rng).await? {
        Some(page) => {
            println!("{}", serde_json::to_string_pretty(&page)?);
            Ok(())
        }
        None => {
            warn!(%category, "Nothing published for category");
            Err(format!("no dataset published for category '{category}'").into())
        }
    }
}
