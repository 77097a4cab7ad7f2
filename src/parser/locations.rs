//! V2Locations parsing and the heuristic used to find the column.
//!
//! Each `;`-separated block is a positional `#` record:
//!
//! ```text
//! Type#FullName#CountryCode#ADM1#ADM2#Lat#Long#FeatureID#Offset
//! ```
//!
//! Blocks with fewer than seven parts are ignored. Mentions are deduplicated
//! by name; the first occurrence keeps its position and coordinates.

use crate::models::{LocationMention, LocationType};

/// Minimum number of `#` parts for a block to count as a location.
const MIN_PARTS: usize = 7;

/// True for a bare signed decimal such as `-12.5`, `48.8667` or `2`.
pub fn looks_numeric(part: &str) -> bool {
    let mut digits = 0;
    for c in part.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' | '-' => {}
            _ => return false,
        }
    }
    digits > 0
}

/// Decide whether a column looks like V2Locations data.
///
/// The column must contain `#`, and at least one of its first seven
/// `#`-separated parts must be a bare number (coordinates or type codes).
pub fn looks_like_locations(column: &str) -> bool {
    !column.is_empty()
        && column.contains('#')
        && column.split('#').take(MIN_PARTS).any(looks_numeric)
}

fn parse_coordinates(lat: &str, lon: &str) -> (Option<f64>, Option<f64>) {
    match (lat.trim().parse::<f64>(), lon.trim().parse::<f64>()) {
        (Ok(lat), Ok(lon)) => (Some(lat), Some(lon)),
        _ => (None, None),
    }
}

/// Parse a V2Locations column into deduplicated mentions.
///
/// * `extract_coordinates` - when false, latitude/longitude stay `None`
/// * `limit` - maximum distinct names kept, 0 keeps all
pub fn parse_v2_locations(
    field: &str,
    extract_coordinates: bool,
    limit: usize,
) -> Vec<LocationMention> {
    let mut mentions: Vec<LocationMention> = Vec::new();

    for block in field.split(';').filter(|b| !b.is_empty()) {
        let parts: Vec<&str> = block.split('#').collect();
        if parts.len() < MIN_PARTS {
            continue;
        }

        let name = parts[1];
        if let Some(existing) = mentions.iter_mut().find(|m| m.name == name) {
            existing.occurrences += 1;
            continue;
        }

        let (latitude, longitude) = if extract_coordinates {
            parse_coordinates(parts[5], parts[6])
        } else {
            (None, None)
        };

        mentions.push(LocationMention {
            kind: LocationType::from_code(parts[0]),
            name: name.to_string(),
            country_code: parts[2].to_string(),
            latitude,
            longitude,
            occurrences: 1,
        });
    }

    if limit > 0 {
        mentions.truncate(limit);
    }
    mentions
}
