//! Immutable configuration passed into the parse, normalize and pipeline stages.
//!
//! [`ExtractConfig`] selects which GKG sub-fields are extracted and how. It can
//! be loaded from a YAML file (every key optional) and is never mutated after
//! startup. [`PipelineConfig`] bundles it with the runtime settings from the CLI.

use crate::cli::Cli;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, instrument};

/// How much of the V2Tone field to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneMode {
    /// Only the first (overall tone) dimension.
    #[default]
    Overall,
    /// All six dimensions.
    Full,
}

/// Text encoding assumed for the lines inside a downloaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEncoding {
    #[default]
    Latin1,
    Utf8,
}

/// Which sub-fields to extract from each GKG line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub themes: bool,
    pub locations: bool,
    pub page_title: bool,
    pub persons: bool,
    pub organizations: bool,
    pub tone: bool,
    pub counts: bool,
    /// Maximum distinct locations kept per article, 0 keeps all.
    pub location_limit: usize,
    /// Maximum distinct themes kept per article, 0 keeps all.
    pub theme_limit: usize,
    pub extract_coordinates: bool,
    pub tone_mode: ToneMode,
    /// Column to read V2Locations from. Unset means scan for it.
    pub location_column: Option<usize>,
    pub line_encoding: LineEncoding,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            themes: true,
            locations: true,
            page_title: true,
            persons: false,
            organizations: false,
            tone: false,
            counts: false,
            location_limit: 3,
            theme_limit: 5,
            extract_coordinates: true,
            tone_mode: ToneMode::Overall,
            location_column: None,
            line_encoding: LineEncoding::Latin1,
        }
    }
}

impl ExtractConfig {
    pub fn from_yaml(text: &str) -> Result<Self, PipelineError> {
        serde_yaml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }

    #[instrument(level = "info")]
    pub fn load(path: &str) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config = Self::from_yaml(&text)?;
        info!(?config, "Loaded extraction config");
        Ok(config)
    }
}

/// Everything the orchestrator needs, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub original_master_url: String,
    pub translation_master_url: String,
    /// Clean archive: translated titles, readable themes and locations.
    pub archive_path: PathBuf,
    /// Raw archive: original titles and codes.
    pub raw_archive_path: PathBuf,
    pub poll_interval: Duration,
    pub translation_workers: usize,
    pub translate: bool,
    pub extract: ExtractConfig,
}

impl PipelineConfig {
    /// Build from parsed CLI arguments, loading the YAML extraction config if given.
    pub fn from_cli(cli: &Cli) -> Result<Self, PipelineError> {
        let extract = match cli.config.as_deref() {
            Some(path) => ExtractConfig::load(path)?,
            None => ExtractConfig::default(),
        };

        if cli.workers == 0 {
            return Err(PipelineError::Config(
                "--workers must be at least 1".to_string(),
            ));
        }
        for master in [&cli.original_master_url, &cli.translation_master_url] {
            url::Url::parse(master)
                .map_err(|e| PipelineError::Config(format!("bad master list URL {master}: {e}")))?;
        }

        Ok(Self {
            original_master_url: cli.original_master_url.clone(),
            translation_master_url: cli.translation_master_url.clone(),
            archive_path: PathBuf::from(&cli.archive),
            raw_archive_path: PathBuf::from(&cli.raw_archive),
            poll_interval: Duration::from_secs(cli.interval_secs),
            translation_workers: cli.workers,
            translate: !cli.no_translate,
            extract,
        })
    }
}
