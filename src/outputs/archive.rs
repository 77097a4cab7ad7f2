//! Append-only CSV archives.
//!
//! Both archives share one fixed column layout, [`COLUMNS`]. A header row is
//! written when a file is created (or found empty) and never again. Before
//! appending to an existing file its header is compared with [`COLUMNS`]; a
//! file written under another layout is rejected instead of being extended.
//!
//! Rows for one batch are encoded in memory first and written with a single
//! append, so a failed encode never leaves half a batch on disk.

use crate::error::PipelineError;
use crate::models::{ArchiveVariant, NormalizedArticle, SinkRecord};
use crate::translate::{NON_ASCII_THRESHOLD, non_ascii_ratio};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, instrument, warn};

/// Canonical column order of every archive.
pub const COLUMNS: [&str; 9] = [
    "date",
    "source_name",
    "url",
    "title",
    "themes",
    "location_names",
    "location_countries",
    "first_location_lat",
    "first_location_lon",
];

/// Separator used inside list cells.
pub const LIST_SEPARATOR: &str = ";";

/// One archive row. Field order must match [`COLUMNS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRow {
    pub date: Option<String>,
    pub source_name: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub themes: Option<String>,
    pub location_names: Option<String>,
    pub location_countries: Option<String>,
    pub first_location_lat: Option<f64>,
    pub first_location_lon: Option<f64>,
}

fn join_list(values: &[String]) -> Option<String> {
    (!values.is_empty()).then(|| values.join(LIST_SEPARATOR))
}

impl From<&NormalizedArticle> for ArchiveRow {
    fn from(article: &NormalizedArticle) -> Self {
        ArchiveRow {
            date: article.date.clone(),
            source_name: article.source_name.clone(),
            url: article.url.clone(),
            title: article.title.clone(),
            themes: join_list(&article.themes),
            location_names: join_list(&article.location_names),
            location_countries: join_list(&article.location_countries),
            first_location_lat: article.first_location_lat,
            first_location_lon: article.first_location_lon,
        }
    }
}

impl From<&ArchiveRow> for SinkRecord {
    fn from(row: &ArchiveRow) -> Self {
        SinkRecord {
            title: row.title.clone().unwrap_or_default(),
            url: row.url.clone().unwrap_or_default(),
            date: row.date.clone().unwrap_or_default(),
            themes: row.themes.clone().unwrap_or_default(),
            location_names: row.location_names.clone().unwrap_or_default(),
            persons: Vec::new(),
            organizations: Vec::new(),
            tone: None,
        }
    }
}

fn expected_header() -> String {
    COLUMNS.join(",")
}

/// First line of `path`, or `None` when the file is missing or zero bytes.
async fn read_header(path: &Path) -> Result<Option<String>, PipelineError> {
    let file = match fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PipelineError::io(path, e)),
    };
    let len = file
        .metadata()
        .await
        .map_err(|e| PipelineError::io(path, e))?
        .len();
    if len == 0 {
        return Ok(None);
    }
    let mut lines = BufReader::new(file).lines();
    let first = lines
        .next_line()
        .await
        .map_err(|e| PipelineError::io(path, e))?
        .unwrap_or_default();
    Ok(Some(first.trim_end_matches('\r').to_string()))
}

/// Verify that the archive at `path` can take more rows.
///
/// Returns `true` when a header still has to be written (missing or
/// zero-byte file) and `false` when the existing header matches [`COLUMNS`].
/// Any other first line is a [`PipelineError::SchemaMismatch`].
pub async fn check_header(path: &Path) -> Result<bool, PipelineError> {
    let expected = expected_header();
    match read_header(path).await? {
        None => Ok(true),
        Some(found) if found == expected => Ok(false),
        Some(found) => Err(PipelineError::SchemaMismatch {
            path: path.to_path_buf(),
            found,
            expected,
        }),
    }
}

/// Encode `rows` as CSV, with a header row first when `with_header` is set.
fn encode_rows(path: &Path, rows: &[ArchiveRow], with_header: bool) -> Result<Vec<u8>, PipelineError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(with_header)
        .from_writer(Vec::new());
    for row in rows {
        wtr.serialize(row).map_err(|e| PipelineError::csv(path, e))?;
    }
    wtr.into_inner()
        .map_err(|e| PipelineError::io(path, e.into_error()))
}

/// Append `articles` to the archive at `path`.
///
/// Returns the number of rows written. An empty batch leaves the file
/// untouched.
#[instrument(level = "info", skip_all, fields(path = %path.display(), %variant, rows = articles.len()))]
pub async fn append(
    path: &Path,
    articles: &[NormalizedArticle],
    variant: ArchiveVariant,
) -> Result<usize, PipelineError> {
    if articles.is_empty() {
        return Ok(0);
    }

    let with_header = check_header(path).await?;
    let rows: Vec<ArchiveRow> = articles.iter().map(ArchiveRow::from).collect();
    let bytes = encode_rows(path, &rows, with_header)?;

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| PipelineError::io(path, e))?;
    file.write_all(&bytes)
        .await
        .map_err(|e| PipelineError::io(path, e))?;
    file.flush().await.map_err(|e| PipelineError::io(path, e))?;

    info!(rows = rows.len(), header = with_header, "Appended to archive");
    Ok(rows.len())
}

/// Read every row of the archive at `path`.
///
/// A missing file reads as empty. The header must match [`COLUMNS`].
pub async fn read_rows(path: &Path) -> Result<Vec<ArchiveRow>, PipelineError> {
    if check_header(path).await? {
        return Ok(Vec::new());
    }

    let bytes = fs::read(path).await.map_err(|e| PipelineError::io(path, e))?;
    csv::Reader::from_reader(bytes.as_slice())
        .deserialize()
        .collect::<Result<Vec<ArchiveRow>, _>>()
        .map_err(|e| PipelineError::csv(path, e))
}

/// The last `limit` rows of the archive, oldest first. `0` returns all rows.
#[instrument(level = "info", skip_all, fields(path = %path.display(), limit = limit))]
pub async fn read_tail(path: &Path, limit: usize) -> Result<Vec<ArchiveRow>, PipelineError> {
    let mut rows = read_rows(path).await?;
    if limit > 0 && rows.len() > limit {
        let cut = rows.len() - limit;
        rows.drain(..cut);
    }
    info!(rows = rows.len(), "Read archive tail");
    Ok(rows)
}

/// True when the row's title is mostly outside ASCII.
pub fn is_non_english(row: &ArchiveRow) -> bool {
    row.title
        .as_deref()
        .is_some_and(|title| non_ascii_ratio(title) > NON_ASCII_THRESHOLD)
}

/// Result of a purge run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    pub kept: usize,
    pub removed: usize,
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".purge.tmp");
    path.with_file_name(name)
}

/// Drop rows whose title is still mostly non-ASCII.
///
/// The file is rewritten through a temporary sibling and a rename, so
/// readers see either the old or the new archive. With `dry_run` nothing is
/// written.
#[instrument(level = "info", skip_all, fields(path = %path.display(), dry_run = dry_run))]
pub async fn purge_non_english(path: &Path, dry_run: bool) -> Result<PurgeReport, PipelineError> {
    let rows = read_rows(path).await?;
    let total = rows.len();
    let kept: Vec<ArchiveRow> = rows.into_iter().filter(|r| !is_non_english(r)).collect();
    let report = PurgeReport {
        kept: kept.len(),
        removed: total - kept.len(),
    };

    if dry_run || report.removed == 0 {
        info!(kept = report.kept, removed = report.removed, "Purge finished without rewriting");
        return Ok(report);
    }

    let bytes = encode_rows(path, &kept, true)?;
    let tmp = temp_path_for(path);
    fs::write(&tmp, &bytes)
        .await
        .map_err(|e| PipelineError::io(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path).await {
        warn!(tmp = %tmp.display(), error = %e, "Rename failed; removing temporary file");
        let _ = fs::remove_file(&tmp).await;
        return Err(PipelineError::io(path, e));
    }

    info!(kept = report.kept, removed = report.removed, "Purged non-English rows");
    Ok(report)
}
