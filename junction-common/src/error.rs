//! Error types and utilities for the junction toolkit
//!
//! Provides the input classification error and fuzzy matching used to suggest
//! the intended input type tag when a caller misspells one.

use strsim::{jaro_winkler, normalized_levenshtein};
use thiserror::Error;

/// Find the best fuzzy match using a hybrid character-based score.
///
/// Combines Jaro-Winkler (70%) with normalized Levenshtein (30%), plus a
/// prefix bonus for inputs of at least three characters. Type tags are short,
/// so the prefix window is capped at the shorter of the two strings.
///
/// Minimum threshold: 0.65 similarity.
fn find_best_fuzzy_match<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let input_lower = input.to_lowercase();
    let mut best_match = None;
    let mut best_score = 0.0f64;

    // Tuned so that "gtsf" -> "gtfs" and "netx" -> "netex" match while
    // unrelated words like "elevation" do not latch onto "dem".
    let min_threshold = 0.65;

    for &candidate in candidates {
        let candidate_lower = candidate.to_lowercase();

        let jw_score = jaro_winkler(&input_lower, &candidate_lower);
        let lev_score = normalized_levenshtein(&input_lower, &candidate_lower);
        let mut score = (jw_score * 0.7) + (lev_score * 0.3);

        let prefix_len = input_lower
            .chars()
            .count()
            .min(candidate_lower.chars().count());
        if prefix_len >= 3 {
            let input_prefix: String = input_lower.chars().take(prefix_len).collect();
            let candidate_prefix: String = candidate_lower.chars().take(prefix_len).collect();
            let prefix_similarity = normalized_levenshtein(&input_prefix, &candidate_prefix);
            if prefix_similarity > 0.7 {
                score += 0.1 * prefix_similarity;
            }
        }

        if score >= min_threshold && score > best_score {
            best_score = score;
            best_match = Some(candidate);
        }
    }

    best_match
}

/// Suggest a correction for a potentially misspelled tag.
///
/// Returns `None` when the input already matches a candidate
/// (case-insensitively) or when nothing is close enough.
pub fn suggest_correction(input: &str, candidates: &[&str]) -> Option<String> {
    if input.trim().is_empty() {
        return None;
    }
    if candidates.iter().any(|c| c.eq_ignore_ascii_case(input)) {
        return None;
    }
    find_best_fuzzy_match(input, candidates).map(str::to_string)
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(tag) => format!(" (did you mean '{tag}'?)"),
        None => String::new(),
    }
}

/// Main error type shared by the junction crates
#[derive(Debug, Error)]
pub enum Error {
    /// An input location whose data type could not be determined
    #[error("Unrecognized input '{location}': {reason}{}", did_you_mean(.suggestion))]
    UnrecognizedInput {
        location: String,
        reason: String,
        suggestion: Option<String>,
    },

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for junction operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    const TAGS: &[&str] = &["osm", "gtfs", "netex", "dem"];

    #[test]
    fn test_suggest_correction_typos() {
        assert_eq!(suggest_correction("gtsf", TAGS), Some("gtfs".to_string()));
        assert_eq!(suggest_correction("netx", TAGS), Some("netex".to_string()));
        assert_eq!(suggest_correction("NETEXX", TAGS), Some("netex".to_string()));
    }

    #[test]
    fn test_suggest_correction_exact_match() {
        assert_eq!(suggest_correction("osm", TAGS), None);
        assert_eq!(suggest_correction("GTFS", TAGS), None);
    }

    #[test]
    fn test_suggest_correction_no_match() {
        assert_eq!(suggest_correction("xyz", TAGS), None);
        assert_eq!(suggest_correction("", TAGS), None);
        assert_eq!(suggest_correction("elevation", TAGS), None);
    }

    #[test]
    fn test_unrecognized_input_display() {
        let err = Error::UnrecognizedInput {
            location: "data/gtsf:feed".to_string(),
            reason: "unknown type tag 'gtsf'".to_string(),
            suggestion: Some("gtfs".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Unrecognized input 'data/gtsf:feed': unknown type tag 'gtsf' (did you mean 'gtfs'?)"
        );

        let err = Error::UnrecognizedInput {
            location: "notes.txt".to_string(),
            reason: "file name matches no known input type".to_string(),
            suggestion: None,
        };
        assert_eq!(
            err.to_string(),
            "Unrecognized input 'notes.txt': file name matches no known input type"
        );
    }
}
