//! Optional GKG sub-fields: persons, organizations, tone and counts.
//!
//! None of these are extracted by default. They are plain functions over a
//! single column so they can be switched on in [`ExtractConfig`] without
//! touching the rest of the parser.
//!
//! [`ExtractConfig`]: crate::config::ExtractConfig

use crate::config::ToneMode;
use crate::models::{CountMention, Tone};

/// Names from a `Name,offset;Name,offset` list, in order, duplicates kept.
fn names_before_offsets(field: &str) -> Vec<String> {
    field
        .split(';')
        .filter(|b| !b.is_empty())
        .filter_map(|b| b.split(',').next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// V2EnhancedPersons: `Joe Biden,234;Kamala Harris,567` -> both names.
pub fn parse_v2_persons(field: &str) -> Vec<String> {
    names_before_offsets(field)
}

/// V2EnhancedOrganizations: `United Nations,134;Apple Inc,789` -> both names.
pub fn parse_v2_organizations(field: &str) -> Vec<String> {
    names_before_offsets(field)
}

/// V2Tone: six comma-separated dimensions.
///
/// Returns `None` for a blank field. In [`ToneMode::Overall`] only the first
/// dimension is kept. Every dimension parses on its own, so one garbled value
/// does not discard the rest.
pub fn parse_v2_tone(field: &str, mode: ToneMode) -> Option<Tone> {
    if field.trim().is_empty() {
        return None;
    }
    let values: Vec<Option<f64>> = field
        .split(',')
        .map(|v| v.trim().parse::<f64>().ok())
        .collect();
    let at = |i: usize| values.get(i).copied().flatten();

    let tone = match mode {
        ToneMode::Overall => Tone {
            tone: at(0),
            ..Default::default()
        },
        ToneMode::Full => Tone {
            tone: at(0),
            positive: at(1),
            negative: at(2),
            polarity: at(3),
            activity: at(4),
            self_reference: at(5),
        },
    };
    (tone != Tone::default()).then_some(tone)
}

/// V2Counts: `KILL#50#militants#Baghdad;PROTEST#1000#students#Paris`.
///
/// Blocks need at least a type and a number; missing trailing parts are empty.
pub fn parse_v2_counts(field: &str) -> Vec<CountMention> {
    field
        .split(';')
        .filter(|b| !b.is_empty())
        .filter_map(|block| {
            let parts: Vec<&str> = block.split('#').collect();
            if parts.len() < 2 {
                return None;
            }
            let part = |i: usize| parts.get(i).copied().unwrap_or_default().to_string();
            Some(CountMention {
                kind: part(0),
                number: part(1),
                object: part(2),
                location: part(3),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persons_and_organizations() {
        assert_eq!(
            parse_v2_persons("Joe Biden,234;Kamala Harris,567"),
            vec!["Joe Biden", "Kamala Harris"]
        );
        assert_eq!(
            parse_v2_organizations("United Nations,134;;Apple Inc,789"),
            vec!["United Nations", "Apple Inc"]
        );
        assert!(parse_v2_persons("").is_empty());
    }

    #[test]
    fn test_tone_overall_only() {
        let tone = parse_v2_tone("-2.5,3.2,5.7,8.9,21.4,0.5", ToneMode::Overall).unwrap();
        assert_eq!(tone.tone, Some(-2.5));
        assert_eq!(tone.positive, None);
    }

    #[test]
    fn test_tone_full_with_gaps() {
        let tone = parse_v2_tone("-2.5,x,5.7", ToneMode::Full).unwrap();
        assert_eq!(tone.tone, Some(-2.5));
        assert_eq!(tone.positive, None);
        assert_eq!(tone.negative, Some(5.7));
        assert_eq!(tone.self_reference, None);
    }

    #[test]
    fn test_tone_blank_or_garbage() {
        assert_eq!(parse_v2_tone("", ToneMode::Full), None);
        assert_eq!(parse_v2_tone("n/a", ToneMode::Overall), None);
    }

    #[test]
    fn test_counts() {
        let counts = parse_v2_counts("KILL#50#militants#Baghdad;PROTEST#1000;BAD");
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].kind, "KILL");
        assert_eq!(counts[0].location, "Baghdad");
        assert_eq!(counts[1].number, "1000");
        assert_eq!(counts[1].object, "");
    }
}
