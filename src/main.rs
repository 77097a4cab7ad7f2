//! # GKG News Pipeline
//!
//! Continuously ingests GDELT Global Knowledge Graph (GKG) files into two
//! parallel CSV archives: a raw one with original titles and taxonomy codes,
//! and a clean one with English titles and readable themes and locations.
//!
//! ## Features
//!
//! - Polls the original and translation GKG master lists for new files
//! - Parses the tab-separated GKG 2.1 record format, including the
//!   heuristically located V2 locations column and the embedded page title
//! - Deduplicates themes and locations with occurrence counts
//! - Translates non-English titles concurrently, in order, with per-title fallback
//! - Optionally forwards cleaned records to an HTTP sink
//!
//! ## Usage
//!
//! ```sh
//! gkg_news_pipeline -a ./data/news.csv -r ./data/news_native.csv
//! gkg_news_pipeline once
//! gkg_news_pipeline purge-non-english --dry-run
//! gkg_news_pipeline --sink-url http://localhost:8000/articles backfill -l 200
//! ```
//!
//! ## Architecture
//!
//! Each tick walks both feeds in turn:
//! 1. **Discovery**: resolve the newest GKG file from the master list
//! 2. **Fetching**: download the zip and decode its lines
//! 3. **Parsing and normalization**: typed fields, then raw and clean renderings
//! 4. **Translation**: bounded-concurrency title translation for the clean rendering
//! 5. **Output**: append to both archives, then forward to the sink

use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod feeds;
mod models;
mod normalize;
mod outputs;
mod parser;
mod pipeline;
mod translate;
mod utils;

use cli::{Cli, Command};
use config::PipelineConfig;
use error::PipelineError;
use feeds::{HttpFeedClient, build_http_client};
use models::SinkRecord;
use outputs::archive;
use outputs::sink::{ArticleSink, ConfiguredSink};
use pipeline::Pipeline;
use translate::GoogleTranslator;
use utils::ensure_writable_parent;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "gkg_news_pipeline starting up");

    let args = Cli::parse();
    let command = args.command();
    debug!(?command, archive = %args.archive, raw_archive = %args.raw_archive, "Parsed CLI arguments");

    let config = PipelineConfig::from_cli(&args)?;
    let client = build_http_client(Duration::from_secs(args.http_timeout_secs))?;
    let sink = ConfiguredSink::from_url(&client, args.sink_url.as_deref())?;

    match command {
        Command::PurgeNonEnglish { dry_run } => {
            let report = archive::purge_non_english(&config.archive_path, dry_run).await?;
            info!(kept = report.kept, removed = report.removed, dry_run, "Purge complete");
            return Ok(());
        }
        Command::Backfill { limit } => {
            backfill(&config.archive_path, &sink, limit).await?;
            return Ok(());
        }
        Command::Run | Command::Once => {}
    }

    // Early check: both archives must be writable before the first download.
    for path in [&config.archive_path, &config.raw_archive_path] {
        if let Err(e) = ensure_writable_parent(path).await {
            error!(
                path = %path.display(),
                error = %e,
                "Archive location is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    let transport = HttpFeedClient::new(client.clone());
    let translator = GoogleTranslator::new(client, args.translate_endpoint.clone());
    let mut pipeline = Pipeline::new(config, transport, translator, sink);

    if command == Command::Once {
        let outcome = pipeline.tick().await;
        info!(
            processed = outcome.processed,
            failed = outcome.failed,
            "Single poll complete"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received; stopping after the current file");
            let _ = shutdown_tx.send(true);
        }
    });

    pipeline.run(shutdown_rx).await;
    Ok(())
}

/// Send the last `limit` rows of the clean archive to the sink.
#[instrument(level = "info", skip(sink))]
async fn backfill(path: &Path, sink: &ConfiguredSink, limit: usize) -> Result<(), PipelineError> {
    if !sink.is_enabled() {
        return Err(PipelineError::Config(
            "backfill needs --sink-url (or NEWS_SINK_URL)".to_string(),
        ));
    }

    let rows = archive::read_tail(path, limit).await?;
    let records: Vec<SinkRecord> = rows.iter().map(SinkRecord::from).collect();
    if records.is_empty() {
        info!("Archive is empty; nothing to backfill");
        return Ok(());
    }

    sink.submit(&records).await?;
    info!(records = records.len(), "Backfill delivered");
    Ok(())
}
