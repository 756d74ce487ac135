//! Numeric attributes of a `Sketch` that can be grouped and tested.
//!
//! Attribute names are resolved once, up front, into a typed accessor; a
//! name that is not a Sketch field, or names a non-numeric field, is a
//! caller error raised before any grouping starts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AnalysisError;
use crate::models::Sketch;

/// Sketch fields that exist but cannot be tested numerically.
const NON_NUMERIC_FIELDS: [&str; 5] = ["id", "title", "scene_type", "cast", "upload_date"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    ViewCount,
    LikeCount,
    CommentCount,
    Duration,
    MeanSentiment,
    StdSentiment,
}

impl Attribute {
    pub const ALL: [Attribute; 6] = [
        Attribute::ViewCount,
        Attribute::LikeCount,
        Attribute::CommentCount,
        Attribute::Duration,
        Attribute::MeanSentiment,
        Attribute::StdSentiment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Attribute::ViewCount => "view_count",
            Attribute::LikeCount => "like_count",
            Attribute::CommentCount => "comment_count",
            Attribute::Duration => "duration",
            Attribute::MeanSentiment => "mean_sentiment",
            Attribute::StdSentiment => "std_sentiment",
        }
    }

    /// Value of this attribute on `sketch`, if collected.
    pub fn value(self, sketch: &Sketch) -> Option<f64> {
        let value = match self {
            Attribute::ViewCount => sketch.view_count.map(|v| v as f64),
            Attribute::LikeCount => sketch.like_count.map(|v| v as f64),
            Attribute::CommentCount => sketch.comment_count.map(|v| v as f64),
            Attribute::Duration => sketch.duration.map(f64::from),
            Attribute::MeanSentiment => sketch.mean_sentiment,
            Attribute::StdSentiment => sketch.std_sentiment,
        };
        value.filter(|v| v.is_finite())
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if let Some(attr) = Attribute::ALL.iter().find(|a| a.name() == name) {
            return Ok(*attr);
        }
        if NON_NUMERIC_FIELDS.contains(&name) {
            Err(AnalysisError::NonNumericAttribute(name.to_string()))
        } else {
            Err(AnalysisError::UnknownAttribute(name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArchiveScene, PlatformVideo};

    #[test]
    fn test_parse_names() {
        for attr in Attribute::ALL {
            assert_eq!(attr.name().parse::<Attribute>().unwrap(), attr);
        }
    }

    #[test]
    fn test_reject_non_numeric_and_unknown() {
        assert!(matches!(
            "scene_type".parse::<Attribute>(),
            Err(AnalysisError::NonNumericAttribute(_))
        ));
        assert!(matches!(
            "dislike_count".parse::<Attribute>(),
            Err(AnalysisError::UnknownAttribute(_))
        ));
    }

    #[test]
    fn test_value_reads_typed_field() {
        let scene = ArchiveScene {
            title: Some("T".into()),
            scene_type: "Sketch".into(),
            cast: vec![],
        };
        let mut sketch = Sketch::from_link(&PlatformVideo::new("v", "T"), &scene);
        assert_eq!(Attribute::ViewCount.value(&sketch), None);
        sketch.view_count = Some(42);
        sketch.mean_sentiment = Some(f64::NAN);
        assert_eq!(Attribute::ViewCount.value(&sketch), Some(42.0));
        assert_eq!(Attribute::MeanSentiment.value(&sketch), None);
    }
}
