//! Pipeline configuration, loadable from JSON. Every field has a default,
//! so a partial file (or none at all) is valid.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::fuzzy::{FuzzyMatcher, Scorer, DEFAULT_THRESHOLD};
use crate::linker::{DuplicatePolicy, RecordLinker};
use crate::normality::DEFAULT_NORMALITY_ALPHA;
use crate::normalize::TitleFilter;
use crate::posthoc::PostHocMethod;
use crate::tester::{GroupStatTester, TestConfig, DEFAULT_ANOVA_ALPHA};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum similarity in [0, 1] for a title match.
    pub match_threshold: f64,
    /// Linking threads; 0 means available parallelism.
    pub workers: usize,
    pub scorer: Scorer,
    pub duplicate_titles: DuplicatePolicy,
    pub anova_alpha: f64,
    pub posthoc_alpha: Option<f64>,
    pub posthoc: Vec<PostHocMethod>,
    pub normality_alpha: f64,
    pub title_filter: TitleFilter,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_THRESHOLD,
            workers: 0,
            scorer: Scorer::default(),
            duplicate_titles: DuplicatePolicy::default(),
            anova_alpha: DEFAULT_ANOVA_ALPHA,
            posthoc_alpha: None,
            posthoc: vec![PostHocMethod::Lsd, PostHocMethod::Tukey],
            normality_alpha: DEFAULT_NORMALITY_ALPHA,
            title_filter: TitleFilter::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// File values if a path is given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_json_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn linker(&self) -> RecordLinker {
        let matcher = FuzzyMatcher::new(self.match_threshold).with_scorer(self.scorer);
        RecordLinker::new(matcher)
            .with_workers(self.workers)
            .with_duplicate_policy(self.duplicate_titles)
    }

    pub fn test_config(&self) -> TestConfig {
        TestConfig {
            anova_alpha: self.anova_alpha,
            posthoc_alpha: self.posthoc_alpha,
            methods: self.posthoc.clone(),
        }
    }

    pub fn tester(&self) -> GroupStatTester {
        GroupStatTester::from_config(&self.test_config())
    }
}
