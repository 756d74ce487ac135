//! Analysis driver: group, screen for normality, test.
//!
//! A session owns the joined sketches together with the grouping memo, so
//! cached boundaries and key universes can never outlive their dataset.

use tracing::{info, info_span};

use crate::attribute::Attribute;
use crate::errors::{AnalysisError, Result};
use crate::grouping::{Dimension, GroupIndexer, DURATION_BOUNDARIES};
use crate::models::Sketch;
use crate::normality::{screen, NormalityVerdict, DEFAULT_NORMALITY_ALPHA};
use crate::report::{AttributeReport, GroupSummary};
use crate::tester::GroupStatTester;

pub struct AnalysisSession {
    sketches: Vec<Sketch>,
    indexer: GroupIndexer,
    tester: GroupStatTester,
    normality_alpha: f64,
}

impl AnalysisSession {
    /// Session with the default tester (ANOVA at 0.01, LSD and Tukey).
    pub fn new(sketches: Vec<Sketch>) -> Result<Self> {
        if sketches.is_empty() {
            return Err(AnalysisError::EmptyDataset("no sketches to analyze".into()));
        }
        Ok(Self {
            sketches,
            indexer: GroupIndexer::new(),
            tester: GroupStatTester::default(),
            normality_alpha: DEFAULT_NORMALITY_ALPHA,
        })
    }

    pub fn with_tester(mut self, tester: GroupStatTester) -> Self {
        self.tester = tester;
        self
    }

    pub fn with_normality_alpha(mut self, alpha: f64) -> Self {
        self.normality_alpha = alpha;
        self
    }

    pub fn sketches(&self) -> &[Sketch] {
        &self.sketches
    }

    /// Drop memoized duration boundaries and group universes.
    pub fn reset_cache(&mut self) {
        self.indexer.reset();
    }

    /// Swap in a new dataset; the memo is reset with it.
    pub fn replace_sketches(&mut self, sketches: Vec<Sketch>) -> Result<()> {
        if sketches.is_empty() {
            return Err(AnalysisError::EmptyDataset("no sketches to analyze".into()));
        }
        self.sketches = sketches;
        self.reset_cache();
        Ok(())
    }

    /// Duration boundaries the duration dimension buckets by.
    pub fn duration_boundaries(&mut self) -> Option<[f64; DURATION_BOUNDARIES]> {
        self.indexer.duration_boundaries(&self.sketches)
    }

    pub fn analyze(&mut self, attribute: Attribute, dimension: Dimension) -> Result<AttributeReport> {
        let span = info_span!("analyze", attribute = %attribute, dimension = %dimension);
        let _guard = span.enter();

        let groups = self.indexer.group_by(&self.sketches, attribute, dimension)?;
        let (normal, verdicts) = screen(&groups, self.normality_alpha);
        info!(formed = groups.len(), normal = normal.len(), "groups screened");

        let summaries = groups
            .iter()
            .map(|(key, values)| {
                let verdict = verdicts
                    .get(key)
                    .cloned()
                    .unwrap_or(NormalityVerdict::TooSmall { n: values.len() });
                GroupSummary::new(key.as_str(), values, verdict)
            })
            .collect();

        let test = self.tester.test(&normal)?;
        Ok(AttributeReport {
            attribute,
            dimension,
            groups: summaries,
            test,
        })
    }

    /// Parse names first so a bad name fails before any grouping.
    pub fn analyze_named(&mut self, attribute: &str, dimension: &str) -> Result<AttributeReport> {
        let attribute: Attribute = attribute.parse()?;
        let dimension: Dimension = dimension.parse()?;
        self.analyze(attribute, dimension)
    }

    /// Every (attribute, dimension) combination, attribute-major.
    pub fn analyze_all(&mut self, attributes: &[Attribute], dimensions: &[Dimension]) -> Result<Vec<AttributeReport>> {
        let mut reports = Vec::with_capacity(attributes.len() * dimensions.len());
        for &attribute in attributes {
            for &dimension in dimensions {
                reports.push(self.analyze(attribute, dimension)?);
            }
        }
        let significant = reports.iter().filter(|r| r.is_significant()).count();
        info!(reports = reports.len(), significant, "analysis finished");
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArchiveScene, PlatformVideo};
    use crate::tester::TestOutcome;

    fn sketch(id: usize, scene_type: &str, views: u64) -> Sketch {
        let scene = ArchiveScene {
            title: Some(format!("Scene {id}")),
            scene_type: scene_type.to_string(),
            cast: vec![Some("X".into())],
        };
        let mut s = Sketch::from_link(&PlatformVideo::new(format!("v{id}"), "t"), &scene);
        s.view_count = Some(views);
        s.duration = Some(60 + id as u32);
        s
    }

    fn dataset() -> Vec<Sketch> {
        let low = [100, 102, 98, 101, 99, 103, 97, 100];
        let high = [500, 510, 495, 505, 498, 502, 507, 493];
        let mut out = Vec::new();
        for (i, v) in low.iter().enumerate() {
            out.push(sketch(i, "Low", *v));
        }
        for (i, v) in high.iter().enumerate() {
            out.push(sketch(100 + i, "High", *v));
        }
        out
    }

    #[test]
    fn test_empty_session_is_fatal() {
        assert!(matches!(AnalysisSession::new(vec![]), Err(AnalysisError::EmptyDataset(_))));
    }

    #[test]
    fn test_analyze_detects_difference() {
        let mut session = AnalysisSession::new(dataset()).unwrap();
        let report = session.analyze(Attribute::ViewCount, Dimension::SceneType).unwrap();
        assert_eq!(report.groups_formed(), 2);
        assert_eq!(report.groups_retained(), 2);
        assert!(report.is_significant());
        let lsd = report
            .test
            .outcome
            .posthoc_for(crate::posthoc::PostHocMethod::Lsd)
            .unwrap();
        assert_eq!(lsd.rejected_count(), 1);
    }

    #[test]
    fn test_bad_names_rejected_before_grouping() {
        let mut session = AnalysisSession::new(dataset()).unwrap();
        assert!(matches!(
            session.analyze_named("title", "scene_type"),
            Err(AnalysisError::NonNumericAttribute(_))
        ));
        assert!(matches!(
            session.analyze_named("view_count", "season"),
            Err(AnalysisError::UnknownDimension(_))
        ));
    }

    #[test]
    fn test_analyze_all_cross_product() {
        let mut session = AnalysisSession::new(dataset()).unwrap();
        let reports = session
            .analyze_all(&[Attribute::ViewCount, Attribute::Duration], &Dimension::ALL)
            .unwrap();
        assert_eq!(reports.len(), 6);
        let actor = &reports[1];
        assert_eq!(actor.dimension, Dimension::Actor);
        // A single actor group can never be compared.
        assert!(matches!(actor.test.outcome, TestOutcome::InsufficientGroups { .. }));
    }

    #[test]
    fn test_replace_sketches_resets_boundaries() {
        let mut session = AnalysisSession::new(dataset()).unwrap();
        let before = session.duration_boundaries().unwrap();
        let shorter: Vec<Sketch> = dataset().into_iter().filter(|s| s.scene_type == "Low").collect();
        session.replace_sketches(shorter).unwrap();
        let after = session.duration_boundaries().unwrap();
        assert!(after[4] < before[4]);
    }
}
