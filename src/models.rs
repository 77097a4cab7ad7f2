//! Data models for GKG feeds, parsed records and their normalized renderings.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`FeedKind`] / [`FeedSource`]: the two polled GKG streams and their
//!   in-memory progress marker
//! - [`RawFields`]: everything pulled out of one tab-separated line
//! - [`ThemeTag`], [`LocationMention`]: deduplicated sub-fields with counts
//! - [`NormalizedArticle`]: one article rendered for the raw or clean archive
//! - [`SinkRecord`]: the narrow shape handed to the downstream sink

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the two GKG streams a file came from.
///
/// The translation stream carries articles that were not written in English;
/// every title from it goes through machine translation. The original stream
/// is nominally English but still contains mistagged foreign titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Original,
    Translation,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedKind::Original => f.write_str("original"),
            FeedKind::Translation => f.write_str("translation"),
        }
    }
}

/// A polled feed and the last file URL it fully processed.
///
/// `last_seen` lives in memory only. It advances after a complete
/// fetch-parse-write cycle and never otherwise.
#[derive(Debug, Clone)]
pub struct FeedSource {
    pub kind: FeedKind,
    /// URL of the master file list enumerating every published file.
    pub master_url: String,
    pub last_seen: Option<String>,
}

impl FeedSource {
    pub fn new(kind: FeedKind, master_url: impl Into<String>) -> Self {
        Self {
            kind,
            master_url: master_url.into(),
            last_seen: None,
        }
    }

    /// True when `url` has not been processed yet by this feed.
    pub fn is_new(&self, url: &str) -> bool {
        self.last_seen.as_deref() != Some(url)
    }
}

/// Geographic resolution of a location mention (first `#` part of a block).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationType {
    Country,
    UsState,
    UsCity,
    WorldCity,
    WorldState,
    /// Any code outside 1..=5, kept so odd rows still parse.
    Unknown,
}

impl LocationType {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "1" => LocationType::Country,
            "2" => LocationType::UsState,
            "3" => LocationType::UsCity,
            "4" => LocationType::WorldCity,
            "5" => LocationType::WorldState,
            _ => LocationType::Unknown,
        }
    }
}

/// A deduplicated theme code and how often it occurred in the article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeTag {
    pub code: String,
    pub occurrences: u32,
}

impl fmt::Display for ThemeTag {
    /// Renders as `CODE` or `CODE:n` when the code recurred.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_with_count(f, &self.code, self.occurrences)
    }
}

/// A deduplicated location mention.
///
/// Position and coordinates come from the first occurrence of the name;
/// `occurrences` counts every block that carried the same name.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationMention {
    pub kind: LocationType,
    pub name: String,
    pub country_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub occurrences: u32,
}

impl LocationMention {
    /// The name as written to the raw archive, `Name:n` when it recurred.
    pub fn display_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LocationMention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_with_count(f, &self.name, self.occurrences)
    }
}

fn write_with_count(f: &mut fmt::Formatter<'_>, value: &str, count: u32) -> fmt::Result {
    if count > 1 {
        write!(f, "{}:{}", value, count)
    } else {
        f.write_str(value)
    }
}

/// The six V2Tone dimensions. Each one parses independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tone {
    pub tone: Option<f64>,
    pub positive: Option<f64>,
    pub negative: Option<f64>,
    pub polarity: Option<f64>,
    pub activity: Option<f64>,
    pub self_reference: Option<f64>,
}

/// One `type#magnitude#object#location` block from the counts field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountMention {
    pub kind: String,
    pub number: String,
    pub object: String,
    pub location: String,
}

/// Optional sub-fields that are only extracted when enabled in the config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleExtras {
    pub persons: Vec<String>,
    pub organizations: Vec<String>,
    pub tone: Option<Tone>,
    pub counts: Vec<CountMention>,
}

impl ArticleExtras {
    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
            && self.organizations.is_empty()
            && self.tone.is_none()
            && self.counts.is_empty()
    }
}

/// Typed sub-fields of a single GKG line.
///
/// Missing columns become `None` or empty collections; a short line still
/// yields a record with partial data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFields {
    pub date: Option<String>,
    pub source_name: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    /// `None` when the themes column is absent or extraction is disabled.
    pub themes: Option<Vec<ThemeTag>>,
    pub locations: Vec<LocationMention>,
    pub extras: ArticleExtras,
}

/// Which of the two sibling archives a rendering is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveVariant {
    /// Original-language title and untouched theme/location codes.
    Raw,
    /// Translated title and human-readable themes/locations.
    Clean,
}

impl fmt::Display for ArchiveVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveVariant::Raw => f.write_str("raw"),
            ArchiveVariant::Clean => f.write_str("clean"),
        }
    }
}

/// One article as it is written to an archive.
///
/// The raw and clean renderings of an article share `date`, `source_name`
/// and `url`; they differ in `title`, `themes` and `location_names`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedArticle {
    pub date: Option<String>,
    pub source_name: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub themes: Vec<String>,
    pub location_names: Vec<String>,
    pub location_countries: Vec<String>,
    pub first_location_lat: Option<f64>,
    pub first_location_lon: Option<f64>,
    pub extras: ArticleExtras,
}

/// Shape accepted by the downstream sink.
///
/// List fields are `;`-joined strings, matching the archive cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkRecord {
    pub title: String,
    pub url: String,
    pub date: String,
    pub themes: String,
    pub location_names: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub persons: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organizations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<Tone>,
}

impl From<&NormalizedArticle> for SinkRecord {
    fn from(article: &NormalizedArticle) -> Self {
        SinkRecord {
            title: article.title.clone().unwrap_or_default(),
            url: article.url.clone().unwrap_or_default(),
            date: article.date.clone().unwrap_or_default(),
            themes: article.themes.join(";"),
            location_names: article.location_names.join(";"),
            persons: article.extras.persons.clone(),
            organizations: article.extras.organizations.clone(),
            tone: article.extras.tone.clone(),
        }
    }
}
