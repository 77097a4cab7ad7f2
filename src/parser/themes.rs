//! V2EnhancedThemes parsing.
//!
//! The field is a `;`-separated list of `CODE,offset` blocks. Offsets are
//! discarded; codes are counted and emitted once each in first-seen order.

use crate::models::ThemeTag;

/// Parse a themes column into deduplicated tags.
///
/// `limit` caps the number of distinct tags kept (0 keeps all). Counts are
/// computed over the whole field, before truncation.
///
/// ```ignore
/// let tags = parse_v2_themes("A,1;B,5;A,9;C", 0);
/// // A:2, B, C
/// ```
pub fn parse_v2_themes(field: &str, limit: usize) -> Vec<ThemeTag> {
    let mut tags: Vec<ThemeTag> = Vec::new();

    for block in field.split(';').filter(|b| !b.trim().is_empty()) {
        let code = block.split(',').next().unwrap_or(block).trim();
        if code.is_empty() {
            continue;
        }
        match tags.iter_mut().find(|t| t.code == code) {
            Some(existing) => existing.occurrences += 1,
            None => tags.push(ThemeTag {
                code: code.to_string(),
                occurrences: 1,
            }),
        }
    }

    if limit > 0 {
        tags.truncate(limit);
    }
    tags
}
