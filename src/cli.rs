//! Command-line interface definitions for the GKG news pipeline.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! All arguments can be provided via command-line flags or environment variables.

use clap::{Parser, Subcommand};

pub const DEFAULT_ORIGINAL_MASTER_URL: &str =
    "http://data.gdeltproject.org/gdeltv2/masterfilelist.txt";
pub const DEFAULT_TRANSLATION_MASTER_URL: &str =
    "http://data.gdeltproject.org/gdeltv2/masterfilelist-translation.txt";
pub const DEFAULT_TRANSLATE_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

/// Command-line arguments for the pipeline.
///
/// # Examples
///
/// ```sh
/// # Poll both feeds forever, appending to ./news.csv and ./news_native.csv
/// gkg_news_pipeline
///
/// # Process whatever is latest right now and exit
/// gkg_news_pipeline --archive data/news.csv --raw-archive data/news_native.csv once
///
/// # Forward every cleaned batch to an HTTP sink
/// gkg_news_pipeline --sink-url http://localhost:8000/articles
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Clean archive (translated titles, readable themes and locations)
    #[arg(short, long, env = "NEWS_ARCHIVE", default_value = "news.csv")]
    pub archive: String,

    /// Raw archive (original titles, theme and location codes)
    #[arg(short, long, env = "NEWS_RAW_ARCHIVE", default_value = "news_native.csv")]
    pub raw_archive: String,

    /// Optional path to a YAML extraction config
    #[arg(short, long)]
    pub config: Option<String>,

    /// Seconds between polls of the master lists
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 60)]
    pub interval_secs: u64,

    /// Concurrent title translations per file
    #[arg(short, long, default_value_t = crate::translate::DEFAULT_WORKERS)]
    pub workers: usize,

    /// Master file list of the English (original) GKG stream
    #[arg(long, env = "GKG_ORIGINAL_MASTER_URL", default_value = DEFAULT_ORIGINAL_MASTER_URL)]
    pub original_master_url: String,

    /// Master file list of the translated GKG stream
    #[arg(long, env = "GKG_TRANSLATION_MASTER_URL", default_value = DEFAULT_TRANSLATION_MASTER_URL)]
    pub translation_master_url: String,

    /// Translation endpoint (auto-detected source language, English target)
    #[arg(long, env = "TRANSLATE_ENDPOINT", default_value = DEFAULT_TRANSLATE_ENDPOINT)]
    pub translate_endpoint: String,

    /// Timeout applied to every HTTP request
    #[arg(long, default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Keep every title in its original language
    #[arg(long)]
    pub no_translate: bool,

    /// HTTP endpoint receiving cleaned records as a JSON array (optional)
    #[arg(long, env = "NEWS_SINK_URL")]
    pub sink_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Poll both feeds forever (the default)
    Run,
    /// Run a single poll of both feeds, then exit
    Once,
    /// Remove rows with non-English titles from the clean archive
    PurgeNonEnglish {
        /// Only report how many rows would be removed
        #[arg(long)]
        dry_run: bool,
    },
    /// Send the most recent archived rows to the sink
    Backfill {
        /// Number of rows from the end of the archive, 0 for all
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}
