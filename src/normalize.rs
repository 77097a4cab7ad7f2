//! Display cleanup for theme codes and location names, and the raw/clean renderings.
//!
//! Theme codes arrive as taxonomy identifiers such as
//! `TAX_FNCACT_PRESIDENT` or `WB_696_PUBLIC_SECTOR_MANAGEMENT`. The clean
//! archive shows them as `President` and `Public Sector Management`.
//! Everything here is a pure string transform.

use crate::models::{ArchiveVariant, NormalizedArticle, RawFields};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;

/// Taxonomy namespace prefixes, tried in order; the first match is stripped.
///
/// Category-specific prefixes come before their parent namespace so that
/// `TAX_FNCACT_PRESIDENT` loses `TAX_FNCACT_` rather than just `TAX_`.
const TAXONOMY_PREFIXES: &[&str] = &[
    r"^TAX_FNCACT_",
    r"^TAX_ETHNICITY_",
    r"^TAX_WORLDLANGUAGES_",
    r"^TAX_RELIGION_",
    r"^TAX_MILITARY_TITLE_",
    r"^TAX_POLITICAL_PARTY_",
    r"^TAX_DISEASE_",
    r"^TAX_WEAPONS_",
    r"^TAX_TERROR_GROUP_",
    r"^TAX_AIDGROUPS_",
    r"^TAX_ECON_PRICE_",
    r"^TAX_SPECIAL_ISSUES_",
    r"^TAX_WORLD[A-Z]+_",
    r"^TAX_",
    r"^WB_\d+_",
    r"^WB_",
    r"^CRISISLEX_[A-Z]\d+_",
    r"^CRISISLEX_",
    r"^UNGP_",
    r"^EPU_POLICY_",
    r"^EPU_",
    r"^ECON_",
    r"^SOC_",
    r"^ENV_",
    r"^MEDIA_",
    r"^GENERAL_",
    r"^USPEC_",
    r"^SLFID_",
];

static PREFIX_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    TAXONOMY_PREFIXES
        .iter()
        .map(|p| Regex::new(p).expect("taxonomy prefix pattern"))
        .collect()
});

static COUNT_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":(\d+)$").expect("count suffix pattern"));

/// Split a trailing `:<n>` occurrence suffix off a value.
///
/// ```ignore
/// assert_eq!(split_count_suffix("TAX_FNCACT:3"), ("TAX_FNCACT", Some(3)));
/// assert_eq!(split_count_suffix("Paris"), ("Paris", None));
/// ```
pub fn split_count_suffix(value: &str) -> (&str, Option<u32>) {
    match COUNT_SUFFIX.captures(value) {
        Some(caps) => {
            let whole = caps.get(0).map_or(value.len(), |m| m.start());
            let count = caps.get(1).and_then(|m| m.as_str().parse().ok());
            (&value[..whole], count)
        }
        None => (value, None),
    }
}

/// Remove the first matching taxonomy namespace prefix.
///
/// A code that would be left empty is returned unchanged.
pub fn strip_taxonomy_prefix(code: &str) -> &str {
    PREFIX_PATTERNS
        .iter()
        .find_map(|re| re.find(code))
        .map(|m| &code[m.end()..])
        .filter(|rest| !rest.is_empty())
        .unwrap_or(code)
}

/// Title-case like most "title" helpers: a letter is upper-cased when it does
/// not follow another letter, lower-cased otherwise.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for c in s.chars() {
        if prev_is_letter {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_is_letter = c.is_alphabetic();
    }
    out
}

/// `TAX_FNCACT_PRESIDENT:2` -> `President`.
///
/// The count suffix is dropped, the namespace prefix stripped, underscores
/// become spaces and the result is title-cased.
pub fn clean_theme_code(code: &str) -> String {
    let (code, _count) = split_count_suffix(code);
    let stripped = strip_taxonomy_prefix(code);
    title_case(stripped.replace('_', " ").trim())
}

/// `united states:3` -> `United States`.
pub fn clean_location_name(name: &str) -> String {
    let (name, _count) = split_count_suffix(name);
    title_case(name.trim())
}

/// Render parsed fields for one of the two archives.
///
/// Both variants carry the original title; the translation stage rewrites
/// the clean one afterwards. Clean themes and locations are deduplicated
/// again because distinct codes can share a display name. Location names and
/// countries stay aligned position by position in both variants.
pub fn render(fields: &RawFields, variant: ArchiveVariant) -> NormalizedArticle {
    let raw_themes = fields
        .themes
        .iter()
        .flatten()
        .map(ToString::to_string);
    let raw_locations = fields
        .locations
        .iter()
        .map(|l| (l.display_name(), l.country_code.clone()));

    let (themes, (location_names, location_countries)): (Vec<String>, (Vec<String>, Vec<String>)) =
        match variant {
            ArchiveVariant::Raw => (raw_themes.collect(), raw_locations.unzip()),
            ArchiveVariant::Clean => (
                raw_themes
                    .map(|t| clean_theme_code(&t))
                    .filter(|t| !t.is_empty())
                    .unique()
                    .collect(),
                raw_locations
                    .map(|(name, country)| (clean_location_name(&name), country))
                    .filter(|(name, _)| !name.is_empty())
                    .unique_by(|(name, _)| name.clone())
                    .unzip(),
            ),
        };

    let first = fields.locations.first();

    NormalizedArticle {
        date: fields.date.clone(),
        source_name: fields.source_name.clone(),
        url: fields.url.clone(),
        title: fields.title.clone(),
        themes,
        location_names,
        location_countries,
        first_location_lat: first.and_then(|l| l.latitude),
        first_location_lon: first.and_then(|l| l.longitude),
        extras: fields.extras.clone(),
    }
}

/// Both renderings of one record: `(raw, clean)`.
pub fn normalize(fields: &RawFields) -> (NormalizedArticle, NormalizedArticle) {
    (
        render(fields, ArchiveVariant::Raw),
        render(fields, ArchiveVariant::Clean),
    )
}
