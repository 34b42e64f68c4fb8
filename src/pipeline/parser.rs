//! Model response parsing.
//!
//! `parse_verdict` is total: any input yields a valid `Verdict`. Fields are
//! defaulted independently:
//!
//! | situation                                   | category | confidence |
//! |---------------------------------------------|----------|------------|
//! | no classification line                      | `other`  | as parsed, else 0.5 |
//! | confidence line missing                     | parsed   | 0.5        |
//! | confidence line not a number                | parsed   | 0.7        |
//! | classification value not a known category   | `other`  | 0.3 (overrides any confidence) |

use crate::pipeline::prompt::{CLASSIFICATION_MARKER, CONFIDENCE_MARKER, REASON_MARKER};
use crate::pipeline::types::{Category, Verdict, VerdictSource};

/// Confidence when the model gave no confidence line.
pub const MISSING_CONFIDENCE: f32 = 0.5;
/// Confidence when the confidence line could not be read as a number.
pub const UNPARSABLE_CONFIDENCE: f32 = 0.7;
/// Confidence when the classification value was not a known category.
pub const UNRECOGNIZED_CATEGORY_CONFIDENCE: f32 = 0.3;
/// Reason when the model gave none.
pub const DEFAULT_REASON: &str = "Parsed from AI response";

/// Turn raw model text into a verdict. Lines may come in any order; when a
/// marker repeats, the last occurrence wins.
pub fn parse_verdict(text: &str) -> Verdict {
    let mut category_token: Option<String> = None;
    let mut confidence = MISSING_CONFIDENCE;
    let mut reason: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim().trim_start_matches(['*', '-', '#', ' ']);

        if let Some(value) = strip_marker(line, CLASSIFICATION_MARKER) {
            category_token = Some(clean_token(value));
        } else if let Some(value) = strip_marker(line, CONFIDENCE_MARKER) {
            confidence = parse_confidence(value).unwrap_or(UNPARSABLE_CONFIDENCE);
        } else if let Some(value) = strip_marker(line, REASON_MARKER) {
            let value = clean_value(value);
            if !value.is_empty() {
                reason = Some(value.to_string());
            }
        }
    }

    let category = match category_token.as_deref() {
        None => Category::Other,
        Some(token) => match Category::from_token(token) {
            Some(category) => category,
            None => {
                confidence = UNRECOGNIZED_CATEGORY_CONFIDENCE;
                Category::Other
            }
        },
    };

    Verdict {
        category,
        confidence,
        reason: reason.unwrap_or_else(|| DEFAULT_REASON.to_string()),
        source: VerdictSource::Model,
    }
}

/// Value after `marker` if `line` starts with it (ASCII case-insensitive).
fn strip_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let head = line.get(..marker.len())?;
    head.eq_ignore_ascii_case(marker)
        .then(|| &line[marker.len()..])
}

fn clean_value(value: &str) -> &str {
    value.trim().trim_matches('*').trim()
}

/// Strip the decoration models like to put around a bare token.
fn clean_token(value: &str) -> String {
    clean_value(value)
        .trim_matches(['"', '\'', '`', '[', ']'])
        .trim_end_matches('.')
        .trim()
        .to_string()
}

/// Finite number, passed through unclamped.
fn parse_confidence(value: &str) -> Option<f32> {
    clean_value(value)
        .parse::<f32>()
        .ok()
        .filter(|c| c.is_finite())
}
