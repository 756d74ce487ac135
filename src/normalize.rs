//! Title normalization shared by the pre-filter and the fuzzy scorers.
//!
//! Platform titles arrive with channel suffixes ("- SNL"), curly quotes and
//! accented names; archive titles are bare. Everything here runs before a
//! similarity score is computed.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::models::PlatformVideo;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Anything that is not an ASCII letter or digit (applied after folding).
pub static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Regex to collapse multiple whitespace into single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to lowercase ASCII.
/// e.g., "Beyoncé" → "beyonce", "Motörhead" → "motorhead"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

/// Straighten curly quotes and spell out ampersands.
pub fn normalize_punctuation(s: &str) -> String {
    let result = s
        .replace(['\u{2018}', '\u{2019}', '\u{00B4}', '\u{0060}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(" & ", " and ");
    MULTI_SPACE.replace_all(&result, " ").to_string()
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Prepare a title for token scoring: fold to ASCII, lowercase, replace every
/// non-alphanumeric run with a single space, trim.
///
/// Apostrophes are dropped rather than split on, so "Wayne's World" and
/// "Waynes World" produce the same tokens.
pub fn process_title(title: &str) -> String {
    let folded = fold_to_ascii(&normalize_punctuation(title)).replace('\'', "");
    NON_ALNUM.replace_all(&folded, " ").trim().to_string()
}

/// Whitespace tokens of a processed title.
pub fn tokens(processed: &str) -> impl Iterator<Item = &str> {
    processed.split_whitespace()
}

// ============================================================================
// TITLE PRE-FILTER
// ============================================================================

/// Channel-title filter applied before linking.
///
/// A video survives when its title contains one of `required_markers`
/// (exact case) and none of `blocked_substrings` (any case). Survivors have
/// every required marker removed and surrounding whitespace trimmed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleFilter {
    pub required_markers: Vec<String>,
    pub blocked_substrings: Vec<String>,
}

impl Default for TitleFilter {
    fn default() -> Self {
        Self {
            required_markers: vec!["- SNL".into(), "- Saturday Night Live".into()],
            blocked_substrings: vec![
                "behind the sketch".into(),
                "behind the scenes".into(),
                "bloopers".into(),
                "(live)".into(),
            ],
        }
    }
}

impl TitleFilter {
    pub fn accepts(&self, title: &str) -> bool {
        let lower = title.to_lowercase();
        self.required_markers.iter().any(|m| title.contains(m.as_str()))
            && !self
                .blocked_substrings
                .iter()
                .any(|b| lower.contains(&b.to_lowercase()))
    }

    pub fn strip_markers(&self, title: &str) -> String {
        let mut result = title.to_string();
        for marker in &self.required_markers {
            result = result.replace(marker.as_str(), "");
        }
        result.trim().to_string()
    }

    /// Filter and clean a channel listing. Videos without a title are dropped.
    pub fn apply(&self, videos: &[PlatformVideo]) -> Vec<PlatformVideo> {
        videos
            .iter()
            .filter_map(|video| {
                let title = video.title.as_deref()?;
                if !self.accepts(title) {
                    return None;
                }
                Some(PlatformVideo {
                    id: video.id.clone(),
                    title: Some(self.strip_markers(title)),
                })
            })
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_title_basic() {
        assert_eq!(process_title("Angry Birds"), "angry birds");
        assert_eq!(process_title("  Wayne’s World: Aerosmith!  "), "waynes world aerosmith");
        assert_eq!(process_title("Déjà Vu (Cold Open)"), "deja vu cold open");
        assert_eq!(process_title("Kenan & Kel"), "kenan and kel");
    }

    #[test]
    fn test_process_title_symbols_only() {
        assert_eq!(process_title("!!!"), "");
    }

    #[test]
    fn test_fold_to_ascii() {
        assert_eq!(fold_to_ascii("Björk"), "bjork");
        assert_eq!(fold_to_ascii("Beyoncé"), "beyonce");
    }

    #[test]
    fn test_filter_requires_marker() {
        let filter = TitleFilter::default();
        assert!(filter.accepts("Angry Birds - SNL"));
        assert!(filter.accepts("Angry Birds - Saturday Night Live"));
        assert!(!filter.accepts("Angry Birds"));
        // Marker match is case-sensitive.
        assert!(!filter.accepts("Angry Birds - snl"));
    }

    #[test]
    fn test_filter_blocks_case_insensitively() {
        let filter = TitleFilter::default();
        assert!(!filter.accepts("Behind the Scenes of Angry Birds - SNL"));
        assert!(!filter.accepts("SNL Bloopers - SNL"));
        assert!(!filter.accepts("Musical Guest (Live) - SNL"));
    }

    #[test]
    fn test_apply_strips_markers_and_trims() {
        let filter = TitleFilter::default();
        let videos = vec![
            PlatformVideo::new("v1", "Angry Birds - SNL"),
            PlatformVideo::new("v2", "Behind the Scenes of Angry Birds - SNL"),
            PlatformVideo {
                id: "v3".into(),
                title: None,
            },
        ];
        let kept = filter.apply(&videos);
        assert_eq!(kept, vec![PlatformVideo::new("v1", "Angry Birds")]);
    }
}
