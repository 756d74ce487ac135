//! Engagement and sentiment enrichment of linked sketches.
//!
//! The platform client and the sentiment model live outside this crate; this
//! module only merges what they return into `Sketch` records and reduces
//! per-comment scores to a mean and population standard deviation.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::Sketch;
use crate::progress::{Phase, PhaseProgress};

// ============================================================================
// Video Statistics
// ============================================================================

/// ISO-8601 duration as returned by the platform, e.g. "PT1H2M3S" or "P1DT5M".
static ISO_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$").unwrap()
});

/// Statistics for one video as delivered by the platform client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoStats {
    pub video_id: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub comment_count: Option<u64>,
    #[serde(default)]
    pub upload_date: Option<DateTime<Utc>>,
}

/// Seconds in an ISO-8601 duration. `None` for anything unparseable,
/// including the bare "P" / "PT" forms.
pub fn parse_iso8601_duration(raw: &str) -> Option<u32> {
    let caps = ISO_DURATION.captures(raw.trim())?;
    if caps.iter().skip(1).all(|c| c.is_none()) {
        return None;
    }
    let part = |idx: usize, unit: u64| -> Option<u64> {
        match caps.get(idx) {
            Some(m) => m.as_str().parse::<u64>().ok()?.checked_mul(unit),
            None => Some(0),
        }
    };
    let total = part(1, 86_400)? + part(2, 3_600)? + part(3, 60)? + part(4, 1)?;
    u32::try_from(total).ok()
}

/// Merge platform statistics into sketches by video id.
/// Stats for unknown ids are ignored. Returns the number of sketches updated.
pub fn apply_video_stats(sketches: &mut [Sketch], stats: &[VideoStats]) -> usize {
    let by_id: FxHashMap<&str, &VideoStats> =
        stats.iter().map(|s| (s.video_id.as_str(), s)).collect();

    let mut updated = 0;
    for sketch in sketches.iter_mut() {
        let Some(stat) = by_id.get(sketch.id.as_str()) else {
            continue;
        };
        sketch.view_count = stat.view_count;
        sketch.like_count = stat.like_count;
        sketch.comment_count = stat.comment_count;
        sketch.upload_date = stat.upload_date;
        sketch.duration = match stat.duration.as_deref() {
            Some(raw) => {
                let parsed = parse_iso8601_duration(raw);
                if parsed.is_none() {
                    warn!(video_id = %sketch.id, raw, "unparseable video duration");
                }
                parsed
            }
            None => None,
        };
        updated += 1;
    }
    info!(updated, total = sketches.len(), "applied video statistics");
    updated
}

// ============================================================================
// Sentiment
// ============================================================================

/// Compound sentiment of a piece of text, in [-1, 1].
pub trait SentimentScorer: Sync {
    fn score(&self, text: &str) -> f64;
}

impl<F> SentimentScorer for F
where
    F: Fn(&str) -> f64 + Sync,
{
    fn score(&self, text: &str) -> f64 {
        self(text)
    }
}

/// Mean and population standard deviation of a set of scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentSummary {
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

pub fn summarize_scores(scores: &[f64]) -> Option<SentimentSummary> {
    if scores.is_empty() {
        return None;
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    Some(SentimentSummary {
        mean,
        std: var.sqrt(),
        count: scores.len(),
    })
}

/// Score every comment in parallel and reduce.
pub fn score_comments<S: SentimentScorer + ?Sized>(
    comments: &[String],
    scorer: &S,
) -> Option<SentimentSummary> {
    let scores: Vec<f64> = comments
        .par_iter()
        .map(|c| scorer.score(c).clamp(-1.0, 1.0))
        .collect();
    summarize_scores(&scores)
}

/// Fill `mean_sentiment` / `std_sentiment` from fetched comments.
///
/// Sketches that already carry both values, or have no comments in
/// `comments_by_id`, are left untouched. Returns the number updated.
pub fn apply_comment_sentiment<S: SentimentScorer + ?Sized>(
    sketches: &mut [Sketch],
    comments_by_id: &FxHashMap<String, Vec<String>>,
    scorer: &S,
) -> usize {
    let pending = sketches.iter().filter(|s| !s.has_sentiment()).count() as u64;
    let mut progress = PhaseProgress::start(Phase::Sentiment, pending);

    let mut updated = 0;
    for sketch in sketches.iter_mut().filter(|s| !s.has_sentiment()) {
        progress.advance();

        let Some(comments) = comments_by_id.get(&sketch.id) else {
            continue;
        };
        let Some(summary) = score_comments(comments, scorer) else {
            continue;
        };
        debug!(
            title = %sketch.title,
            mean = summary.mean,
            std = summary.std,
            comments = summary.count,
            "analyzed comments"
        );
        sketch.mean_sentiment = Some(summary.mean);
        sketch.std_sentiment = Some(summary.std);
        updated += 1;
    }
    progress.finish(format!("Analyzed comments for {} videos", updated));
    updated
}

/// Reset sentiment so the next run recomputes it.
pub fn clear_sentiment(sketches: &mut [Sketch]) {
    for sketch in sketches.iter_mut() {
        sketch.mean_sentiment = None;
        sketch.std_sentiment = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArchiveScene, PlatformVideo};

    fn sketch(id: &str) -> Sketch {
        let scene = ArchiveScene {
            title: Some(format!("Title {id}")),
            scene_type: "Sketch".into(),
            cast: vec![],
        };
        Sketch::from_link(&PlatformVideo::new(id, "x"), &scene)
    }

    #[test]
    fn test_parse_iso8601_duration() {
        assert_eq!(parse_iso8601_duration("PT5M3S"), Some(303));
        assert_eq!(parse_iso8601_duration("PT1H"), Some(3600));
        assert_eq!(parse_iso8601_duration("PT45S"), Some(45));
        assert_eq!(parse_iso8601_duration("P1DT1S"), Some(86_401));
        assert_eq!(parse_iso8601_duration("PT"), None);
        assert_eq!(parse_iso8601_duration("5:03"), None);
    }

    #[test]
    fn test_apply_video_stats_by_id() {
        let mut sketches = vec![sketch("a"), sketch("b")];
        let stats = vec![
            VideoStats {
                video_id: "b".into(),
                duration: Some("PT2M".into()),
                view_count: Some(100),
                like_count: Some(5),
                comment_count: Some(2),
                upload_date: None,
            },
            VideoStats {
                video_id: "zzz".into(),
                duration: None,
                view_count: Some(1),
                like_count: None,
                comment_count: None,
                upload_date: None,
            },
        ];
        assert_eq!(apply_video_stats(&mut sketches, &stats), 1);
        assert_eq!(sketches[0].view_count, None);
        assert_eq!(sketches[1].view_count, Some(100));
        assert_eq!(sketches[1].duration, Some(120));
        // Archive-side fields are untouched.
        assert_eq!(sketches[1].scene_type, "Sketch");
    }

    #[test]
    fn test_summarize_scores_population_std() {
        let summary = summarize_scores(&[1.0, -1.0]).unwrap();
        assert_eq!(summary.mean, 0.0);
        assert_eq!(summary.std, 1.0);
        assert!(summarize_scores(&[]).is_none());
    }

    #[test]
    fn test_apply_comment_sentiment_skips_scored() {
        let mut sketches = vec![sketch("a"), sketch("b"), sketch("c")];
        sketches[1].mean_sentiment = Some(0.9);
        sketches[1].std_sentiment = Some(0.0);

        let mut comments = FxHashMap::default();
        comments.insert("a".to_string(), vec!["great".to_string(), "awful".to_string()]);
        comments.insert("b".to_string(), vec!["awful".to_string()]);

        let scorer = |text: &str| if text == "great" { 0.5 } else { -0.5 };
        let updated = apply_comment_sentiment(&mut sketches, &comments, &scorer);

        assert_eq!(updated, 1);
        assert_eq!(sketches[0].mean_sentiment, Some(0.0));
        assert_eq!(sketches[0].std_sentiment, Some(0.5));
        assert_eq!(sketches[1].mean_sentiment, Some(0.9));
        assert_eq!(sketches[2].mean_sentiment, None);
    }

    #[test]
    fn test_clear_sentiment() {
        let mut sketches = vec![sketch("a")];
        sketches[0].mean_sentiment = Some(0.1);
        sketches[0].std_sentiment = Some(0.2);
        clear_sentiment(&mut sketches);
        assert!(!sketches[0].has_sentiment());
    }
}
