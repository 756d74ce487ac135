//! ANOVA gate followed by pairwise post-hoc comparisons.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::anova::{one_way_anova, AnovaResult};
use crate::errors::Result;
use crate::grouping::{group_sizes, Groups};
use crate::posthoc::{PostHocMethod, PostHocReport, PostHocTest};

/// Default ANOVA significance level. Stricter than 0.05 because every
/// significant result fans out into many pairwise comparisons.
pub const DEFAULT_ANOVA_ALPHA: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    pub anova_alpha: f64,
    /// Falls back to `anova_alpha` when unset.
    pub posthoc_alpha: Option<f64>,
    pub methods: Vec<PostHocMethod>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            anova_alpha: DEFAULT_ANOVA_ALPHA,
            posthoc_alpha: None,
            methods: vec![PostHocMethod::Lsd, PostHocMethod::Tukey],
        }
    }
}

impl TestConfig {
    pub fn effective_posthoc_alpha(&self) -> f64 {
        self.posthoc_alpha.unwrap_or(self.anova_alpha)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum TestOutcome {
    /// Fewer than two groups to compare; nothing was tested.
    InsufficientGroups { found: usize },
    /// ANOVA p-value at or above alpha; no post-hoc run.
    FailToReject { anova: AnovaResult },
    /// ANOVA rejected equal means; one report per post-hoc method.
    Reject {
        anova: AnovaResult,
        posthoc: Vec<PostHocReport>,
    },
}

impl TestOutcome {
    pub fn anova(&self) -> Option<&AnovaResult> {
        match self {
            TestOutcome::InsufficientGroups { .. } => None,
            TestOutcome::FailToReject { anova } | TestOutcome::Reject { anova, .. } => Some(anova),
        }
    }

    pub fn is_significant(&self) -> bool {
        matches!(self, TestOutcome::Reject { .. })
    }

    pub fn posthoc(&self) -> &[PostHocReport] {
        match self {
            TestOutcome::Reject { posthoc, .. } => posthoc,
            _ => &[],
        }
    }

    pub fn posthoc_for(&self, method: PostHocMethod) -> Option<&PostHocReport> {
        self.posthoc().iter().find(|r| r.method == method)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestReport {
    pub group_sizes: BTreeMap<String, usize>,
    pub anova_alpha: f64,
    pub outcome: TestOutcome,
}

pub struct GroupStatTester {
    anova_alpha: f64,
    posthoc: Vec<Box<dyn PostHocTest>>,
}

impl Default for GroupStatTester {
    fn default() -> Self {
        Self::from_config(&TestConfig::default())
    }
}

impl GroupStatTester {
    /// Tester with no post-hoc methods attached.
    pub fn new(anova_alpha: f64) -> Self {
        Self {
            anova_alpha,
            posthoc: Vec::new(),
        }
    }

    pub fn from_config(config: &TestConfig) -> Self {
        let alpha = config.effective_posthoc_alpha();
        let mut tester = Self::new(config.anova_alpha);
        for method in &config.methods {
            tester.posthoc.push(method.build(alpha));
        }
        tester
    }

    pub fn with_posthoc(mut self, test: Box<dyn PostHocTest>) -> Self {
        self.posthoc.push(test);
        self
    }

    pub fn anova_alpha(&self) -> f64 {
        self.anova_alpha
    }

    /// ANOVA across all groups, then post-hoc comparisons if it rejects.
    pub fn test(&self, groups: &Groups) -> Result<TestReport> {
        let sizes = group_sizes(groups);
        if groups.len() < 2 {
            info!(groups = groups.len(), "insufficient groups for ANOVA");
            return Ok(TestReport {
                group_sizes: sizes,
                anova_alpha: self.anova_alpha,
                outcome: TestOutcome::InsufficientGroups { found: groups.len() },
            });
        }

        let anova = one_way_anova(groups)?;
        let outcome = self.decide(groups, anova)?;
        Ok(TestReport {
            group_sizes: sizes,
            anova_alpha: self.anova_alpha,
            outcome,
        })
    }

    /// Turn an ANOVA result into an outcome, running post-hoc tests only
    /// when the null hypothesis is rejected.
    pub fn decide(&self, groups: &Groups, anova: AnovaResult) -> Result<TestOutcome> {
        let significant = anova.p_value < self.anova_alpha;
        if !significant {
            info!(
                f = anova.f,
                p = anova.p_value,
                alpha = self.anova_alpha,
                "fail to reject null hypothesis"
            );
            return Ok(TestOutcome::FailToReject { anova });
        }

        info!(
            f = anova.f,
            p = anova.p_value,
            alpha = self.anova_alpha,
            "reject null hypothesis"
        );
        let mut posthoc = Vec::with_capacity(self.posthoc.len());
        for test in &self.posthoc {
            let report = test.compare(groups, &anova)?;
            debug!(
                method = %report.method,
                pairs = report.comparisons.len(),
                rejected = report.rejected_count(),
                "post-hoc comparisons"
            );
            posthoc.push(report);
        }
        Ok(TestOutcome::Reject { anova, posthoc })
    }
}
