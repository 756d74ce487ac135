//! Approximate title matching.
//!
//! Platform titles often carry extra words ("Cold Open", "ft. Host") or a
//! different word order than the archive title, so the default scorer is a
//! token-set ratio: it compares the shared tokens against each side's
//! leftovers and keeps the best of the three comparisons. A title whose
//! tokens are a subset of the other's scores 100.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::normalize::{process_title, tokens};

// ============================================================================
// Score Thresholds
// ============================================================================

/// Default minimum similarity (fraction of 100) to accept a match.
/// High on purpose: a false match silently corrupts the joined dataset.
pub const DEFAULT_THRESHOLD: f64 = 0.9;

/// Score for identical strings.
pub const MAX_SCORE: u8 = 100;

// ============================================================================
// Scorers
// ============================================================================

/// Similarity function used to rank candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scorer {
    /// Token-set ratio over processed titles.
    #[default]
    TokenSet,
    /// Normalized Levenshtein similarity over processed titles.
    Levenshtein,
}

impl Scorer {
    /// Score two already-processed titles on a 0-100 scale.
    pub fn score_processed(self, a: &str, b: &str) -> u8 {
        match self {
            Scorer::TokenSet => token_set_ratio_processed(a, b),
            Scorer::Levenshtein => levenshtein_ratio_processed(a, b),
        }
    }

    /// Score two raw titles on a 0-100 scale.
    pub fn score(self, a: &str, b: &str) -> u8 {
        if a == b {
            return MAX_SCORE;
        }
        self.score_processed(&process_title(a), &process_title(b))
    }
}

/// Length of the longest common subsequence of two byte strings.
fn lcs_len(a: &[u8], b: &[u8]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Indel similarity: `2 * LCS / (len_a + len_b)`, scaled to 0-100 and rounded.
/// Empty input scores 0.
pub fn indel_ratio(a: &str, b: &str) -> u8 {
    let total = a.len() + b.len();
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let lcs = lcs_len(a.as_bytes(), b.as_bytes());
    (200.0 * lcs as f64 / total as f64).round() as u8
}

fn join_sorted<'a>(words: impl Iterator<Item = &'a str>) -> String {
    let mut words: Vec<&str> = words.collect();
    words.sort_unstable();
    words.join(" ")
}

fn token_set_ratio_processed(a: &str, b: &str) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let tokens_a: FxHashSet<&str> = tokens(a).collect();
    let tokens_b: FxHashSet<&str> = tokens(b).collect();

    let sect = join_sorted(tokens_a.intersection(&tokens_b).copied());
    let diff_ab = join_sorted(tokens_a.difference(&tokens_b).copied());
    let diff_ba = join_sorted(tokens_b.difference(&tokens_a).copied());

    let combined_ab = format!("{} {}", sect, diff_ab).trim().to_string();
    let combined_ba = format!("{} {}", sect, diff_ba).trim().to_string();

    indel_ratio(&sect, &combined_ab)
        .max(indel_ratio(&sect, &combined_ba))
        .max(indel_ratio(&combined_ab, &combined_ba))
}

fn levenshtein_ratio_processed(a: &str, b: &str) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    (strsim::normalized_levenshtein(a, b) * 100.0).round() as u8
}

/// Token-set ratio of two raw titles (0-100).
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    Scorer::TokenSet.score(a, b)
}

// ============================================================================
// Candidate Set
// ============================================================================

/// Archive titles eligible for matching, processed once per linking run.
///
/// Duplicate titles collapse to one entry; resolving which scene a title
/// refers to is the linker's job.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    titles: Vec<String>,
    processed: Vec<String>,
}

impl CandidateSet {
    pub fn new<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut set = CandidateSet::default();
        for title in titles {
            let title = title.into();
            if !seen.insert(title.clone()) {
                continue;
            }
            set.processed.push(process_title(&title));
            set.titles.push(title);
        }
        set
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    pub fn titles(&self) -> &[String] {
        &self.titles
    }
}

// ============================================================================
// Matcher
// ============================================================================

/// Best candidate found for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleMatch<'a> {
    pub title: &'a str,
    pub score: u8,
}

/// Thresholded best-match search over a candidate set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyMatcher {
    threshold: f64,
    scorer: Scorer,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl FuzzyMatcher {
    /// `threshold` is a fraction in [0, 1]; values outside are clamped.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
            scorer: Scorer::default(),
        }
    }

    pub fn with_scorer(mut self, scorer: Scorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn scorer(&self) -> Scorer {
        self.scorer
    }

    fn accepts(&self, score: u8) -> bool {
        f64::from(score) + 1e-9 >= self.threshold * 100.0
    }

    /// Highest-scoring candidate if it clears the threshold.
    ///
    /// Among equal top scores the earliest candidate is returned. "No match"
    /// is a normal outcome and is reported as `None`.
    pub fn best_match<'a>(&self, query: &str, candidates: &'a CandidateSet) -> Option<TitleMatch<'a>> {
        let processed_query = process_title(query);
        let mut best: Option<TitleMatch<'a>> = None;

        for (title, processed) in candidates.titles.iter().zip(&candidates.processed) {
            let score = if title == query {
                MAX_SCORE
            } else {
                self.scorer.score_processed(&processed_query, processed)
            };
            if best.map_or(true, |b| score > b.score) {
                best = Some(TitleMatch { title, score });
                if score == MAX_SCORE {
                    break;
                }
            }
        }

        best.filter(|m| self.accepts(m.score))
    }
}

/// One-shot best match over a plain slice of candidate titles.
pub fn best_match<'a, S: AsRef<str>>(query: &str, candidates: &'a [S], threshold: f64) -> Option<&'a str> {
    let matcher = FuzzyMatcher::new(threshold);
    let set = CandidateSet::new(candidates.iter().map(|c| c.as_ref().to_string()));
    let found = matcher.best_match(query, &set)?.title.to_string();
    candidates
        .iter()
        .map(|c| c.as_ref())
        .find(|c| *c == found)
}
