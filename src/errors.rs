use std::io;

use thiserror::Error;

/// Error type for linking, grouping and statistical testing failures.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("dataset is empty: {0}")]
    EmptyDataset(String),
    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),
    #[error("attribute '{0}' is not numeric and cannot be grouped or tested")]
    NonNumericAttribute(String),
    #[error("unknown grouping dimension '{0}'")]
    UnknownDimension(String),
    #[error("sample of size {size} is too small for {test} (need at least {min})")]
    SampleTooSmall {
        test: &'static str,
        size: usize,
        min: usize,
    },
    #[error("{test} cannot assess this sample: {reason}")]
    DegenerateSample {
        test: &'static str,
        reason: &'static str,
    },
    #[error("invalid distribution parameters: {0}")]
    Distribution(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Wraps a distribution constructor failure from `statrs`.
pub(crate) fn distribution_error(e: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::Distribution(e.to_string())
}

