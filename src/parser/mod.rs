//! GKG line parsing.
//!
//! A GKG 2.1 record is one tab-separated line. Date, source and URL sit at
//! fixed columns; themes, counts, persons, organizations and tone have fixed
//! columns too. The page title and the V2Locations column are located by
//! scanning from the end of the line, because their positions are not stable
//! across the files published by the two streams.
//!
//! # Submodules
//!
//! - [`themes`]: theme codes with per-article counts
//! - [`locations`]: geolocation blocks and the column heuristic
//! - [`extras`]: persons, organizations, tone and counts (off by default)

pub mod extras;
pub mod locations;
pub mod themes;

use crate::config::ExtractConfig;
use crate::models::{ArticleExtras, LocationMention, RawFields};
use tracing::{debug, instrument};

pub const DATE_COLUMN: usize = 1;
pub const SOURCE_NAME_COLUMN: usize = 3;
pub const URL_COLUMN: usize = 4;
pub const COUNTS_COLUMN: usize = 6;
pub const THEMES_COLUMN: usize = 8;
pub const PERSONS_COLUMN: usize = 12;
pub const ORGANIZATIONS_COLUMN: usize = 14;
pub const TONE_COLUMN: usize = 15;

/// Lowest column index visited by the backward scans.
pub const FIRST_SCANNED_COLUMN: usize = 6;

const PAGE_TITLE_START: &str = "<PAGE_TITLE>";
const PAGE_TITLE_END: &str = "</PAGE_TITLE>";

/// How the locations of a line were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationLookup {
    /// The configured fixed column held location data.
    Fixed(usize),
    /// The backward scan found a matching column.
    Heuristic(usize),
    /// No column yielded a valid location block.
    NotFound,
}

/// Per-file parse counters, logged once after a batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseStats {
    pub lines: usize,
    pub missing_title: usize,
    pub missing_locations: usize,
    /// Lines where a configured location column missed and the scan ran.
    pub location_fallbacks: usize,
}

/// Text between the page title tags of an extras column, if present.
pub fn extract_page_title(column: &str) -> Option<&str> {
    let start = column.find(PAGE_TITLE_START)? + PAGE_TITLE_START.len();
    let len = column[start..].find(PAGE_TITLE_END)?;
    Some(&column[start..start + len])
}

/// Scan from the last column toward [`FIRST_SCANNED_COLUMN`] for a non-empty page title.
pub fn find_page_title(cols: &[&str]) -> Option<String> {
    (FIRST_SCANNED_COLUMN..cols.len())
        .rev()
        .filter(|&idx| cols[idx].contains(PAGE_TITLE_START))
        .find_map(|idx| extract_page_title(cols[idx]).filter(|t| !t.is_empty()))
        .map(str::to_string)
}

/// Find and parse the V2Locations column.
///
/// A configured `location_column` is tried first. Otherwise (or when it does
/// not hold location data) columns are scanned backward; a candidate that
/// yields no valid block does not end the scan.
pub fn find_locations(
    cols: &[&str],
    config: &ExtractConfig,
) -> (Vec<LocationMention>, LocationLookup) {
    let parse = |column: &str| {
        locations::parse_v2_locations(column, config.extract_coordinates, config.location_limit)
    };

    if let Some(idx) = config.location_column {
        if let Some(column) = cols.get(idx).filter(|c| locations::looks_like_locations(c)) {
            let found = parse(column);
            if !found.is_empty() {
                return (found, LocationLookup::Fixed(idx));
            }
        }
    }

    for idx in (FIRST_SCANNED_COLUMN..cols.len()).rev() {
        if !locations::looks_like_locations(cols[idx]) {
            continue;
        }
        let found = parse(cols[idx]);
        if !found.is_empty() {
            return (found, LocationLookup::Heuristic(idx));
        }
    }
    (Vec::new(), LocationLookup::NotFound)
}

fn column(cols: &[&str], idx: usize) -> Option<String> {
    cols.get(idx).map(|c| c.to_string())
}

fn parse_extras(cols: &[&str], config: &ExtractConfig) -> ArticleExtras {
    let mut extras = ArticleExtras::default();
    if config.persons {
        if let Some(field) = cols.get(PERSONS_COLUMN) {
            extras.persons = extras::parse_v2_persons(field);
        }
    }
    if config.organizations {
        if let Some(field) = cols.get(ORGANIZATIONS_COLUMN) {
            extras.organizations = extras::parse_v2_organizations(field);
        }
    }
    if config.tone {
        extras.tone = cols
            .get(TONE_COLUMN)
            .and_then(|field| extras::parse_v2_tone(field, config.tone_mode));
    }
    if config.counts {
        if let Some(field) = cols.get(COUNTS_COLUMN) {
            extras.counts = extras::parse_v2_counts(field);
        }
    }
    extras
}

/// Parse one line, also reporting how its locations were found.
pub fn parse_line_with_lookup(line: &str, config: &ExtractConfig) -> (RawFields, LocationLookup) {
    let cols: Vec<&str> = line.split('\t').collect();

    let title = if config.page_title {
        find_page_title(&cols)
    } else {
        None
    };

    let themes = if config.themes {
        cols.get(THEMES_COLUMN)
            .map(|field| themes::parse_v2_themes(field, config.theme_limit))
    } else {
        None
    };

    let (locations, lookup) = if config.locations {
        find_locations(&cols, config)
    } else {
        (Vec::new(), LocationLookup::NotFound)
    };

    let fields = RawFields {
        date: column(&cols, DATE_COLUMN),
        source_name: column(&cols, SOURCE_NAME_COLUMN),
        url: column(&cols, URL_COLUMN),
        title,
        themes,
        locations,
        extras: parse_extras(&cols, config),
    };
    (fields, lookup)
}

/// Parse one raw GKG line into typed sub-fields.
///
/// Never fails: columns that are missing or malformed leave their field empty.
pub fn parse_line(line: &str, config: &ExtractConfig) -> RawFields {
    parse_line_with_lookup(line, config).0
}

/// Parse every line of a file, preserving order.
#[instrument(level = "debug", skip_all, fields(lines = lines.len()))]
pub fn parse_lines(lines: &[String], config: &ExtractConfig) -> (Vec<RawFields>, ParseStats) {
    let mut stats = ParseStats {
        lines: lines.len(),
        ..Default::default()
    };

    let records: Vec<RawFields> = lines
        .iter()
        .map(|line| {
            let (fields, lookup) = parse_line_with_lookup(line, config);
            if config.page_title && fields.title.is_none() {
                stats.missing_title += 1;
            }
            match lookup {
                LocationLookup::NotFound if config.locations => stats.missing_locations += 1,
                LocationLookup::Heuristic(idx) if config.location_column.is_some() => {
                    stats.location_fallbacks += 1;
                    debug!(column = idx, "Configured location column missed; used scanned column");
                }
                _ => {}
            }
            fields
        })
        .collect();

    (records, stats)
}
