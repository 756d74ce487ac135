//! Core data models for sketch linking and analysis.
//!
//! Archive scenes and platform videos are read-only inputs produced by the
//! collection layer. A `Sketch` is created once per successful link and is
//! the unit every grouping and test works on.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Input Models
// ============================================================================

/// One scene scraped from the episode archive.
/// Monologues carry no title; cast cells can be empty on the archive side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchiveScene {
    #[serde(default)]
    pub title: Option<String>,
    pub scene_type: String,
    #[serde(default)]
    pub cast: Vec<Option<String>>,
}

impl ArchiveScene {
    /// Cast names with null and blank entries removed, in archive order.
    pub fn cast_names(&self) -> Vec<String> {
        self.cast
            .iter()
            .flatten()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// One video from the platform channel listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlatformVideo {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl PlatformVideo {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: Some(title.into()),
        }
    }

    /// Title if present and not blank.
    pub fn usable_title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

// ============================================================================
// Joined Model
// ============================================================================

/// A comedy scene cross-referenced with its platform video.
///
/// `scene_type` and `cast` come from the archive at link time and are never
/// rewritten afterwards. Engagement and sentiment fields stay `None` until
/// the enrichment step fills them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sketch {
    pub id: String,
    pub title: String,
    pub scene_type: String,
    #[serde(default, deserialize_with = "deserialize_cast")]
    pub cast: Vec<String>,
    #[serde(default)]
    pub upload_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub comment_count: Option<u64>,
    #[serde(default)]
    pub mean_sentiment: Option<f64>,
    #[serde(default)]
    pub std_sentiment: Option<f64>,
}

impl Sketch {
    /// Builds a fresh Sketch from a linked (video, scene) pair.
    /// The canonical archive title wins over the platform title.
    pub fn from_link(video: &PlatformVideo, scene: &ArchiveScene) -> Self {
        let title = scene
            .title
            .clone()
            .or_else(|| video.title.clone())
            .unwrap_or_default();
        Self {
            id: video.id.clone(),
            title,
            scene_type: scene.scene_type.clone(),
            cast: scene.cast_names(),
            upload_date: None,
            duration: None,
            view_count: None,
            like_count: None,
            comment_count: None,
            mean_sentiment: None,
            std_sentiment: None,
        }
    }

    pub fn has_sentiment(&self) -> bool {
        self.mean_sentiment.is_some() && self.std_sentiment.is_some()
    }
}

/// Older snapshots stored the raw archive cast, nulls included.
fn deserialize_cast<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Option<String>>> = Option::deserialize(deserializer)?;
    Ok(raw.unwrap_or_default().into_iter().flatten().collect())
}

// ============================================================================
// Snapshots
// ============================================================================

/// `scenes.json`: the archive scrape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub last_collected: NaiveDateTime,
    pub scene_data: Vec<ArchiveScene>,
    /// Entries dropped while loading because they did not parse.
    #[serde(skip)]
    pub malformed: usize,
}

/// `channel_videos.json`: ids and raw titles of every channel upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VideoSnapshot {
    pub last_collected: NaiveDateTime,
    pub channel_videos: Vec<PlatformVideo>,
    #[serde(skip)]
    pub malformed: usize,
}

/// `full_data.json`: the joined and enriched dataset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FullDataSnapshot {
    pub last_collected: NaiveDateTime,
    pub full_data: Vec<Sketch>,
}

impl FullDataSnapshot {
    /// Stamps the sketches with the current local time.
    pub fn now(full_data: Vec<Sketch>) -> Self {
        Self {
            last_collected: chrono::Local::now().naive_local(),
            full_data,
        }
    }
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Per-run linking counts.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub videos_in: usize,
    pub skipped_no_title: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub ambiguous: usize,
    pub candidate_titles: usize,
    /// Snapshot entries (scenes and videos) that failed to parse and never reached the linker.
    pub malformed_records: usize,
    /// Videos whose outcome never came back because a worker died.
    pub lost: usize,
}

impl LinkStats {
    /// Videos with a recorded outcome.
    pub fn accounted(&self) -> usize {
        self.skipped_no_title + self.matched + self.unmatched + self.ambiguous
    }

    /// Match rate over the videos that were actually attempted.
    pub fn match_rate(&self) -> f64 {
        let attempted = self.videos_in - self.skipped_no_title;
        if attempted == 0 {
            0.0
        } else {
            100.0 * self.matched as f64 / attempted as f64
        }
    }

    pub fn log(&self) {
        tracing::info!(
            videos_in = self.videos_in,
            skipped_no_title = self.skipped_no_title,
            matched = self.matched,
            unmatched = self.unmatched,
            ambiguous = self.ambiguous,
            candidate_titles = self.candidate_titles,
            malformed_records = self.malformed_records,
            lost = self.lost,
            match_rate = %format!("{:.1}%", self.match_rate()),
            "linking finished"
        );
    }
}
