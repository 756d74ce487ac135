//! Per-(attribute, dimension) analysis reports: JSON and plain text.

use std::fmt;

use serde::Serialize;

use crate::anova::mean;
use crate::attribute::Attribute;
use crate::errors::Result;
use crate::grouping::Dimension;
use crate::normality::NormalityVerdict;
use crate::tester::{TestOutcome, TestReport};

/// One group as it entered the normality screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub key: String,
    pub n: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1).
    pub std: f64,
    pub normality: NormalityVerdict,
}

impl GroupSummary {
    pub fn new(key: impl Into<String>, values: &[f64], normality: NormalityVerdict) -> Self {
        let n = values.len();
        let m = if n > 0 { mean(values) } else { f64::NAN };
        let std = if n > 1 {
            (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        } else {
            f64::NAN
        };
        Self {
            key: key.into(),
            n,
            mean: m,
            std,
            normality,
        }
    }

    pub fn retained(&self) -> bool {
        self.normality.is_retained()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeReport {
    pub attribute: Attribute,
    pub dimension: Dimension,
    /// Every group of at least the minimum size, retained or not.
    pub groups: Vec<GroupSummary>,
    pub test: TestReport,
}

impl AttributeReport {
    pub fn groups_formed(&self) -> usize {
        self.groups.len()
    }

    pub fn groups_retained(&self) -> usize {
        self.groups.iter().filter(|g| g.retained()).count()
    }

    pub fn is_significant(&self) -> bool {
        self.test.outcome.is_significant()
    }
}

fn verdict_label(verdict: &NormalityVerdict) -> String {
    match verdict {
        NormalityVerdict::TooSmall { .. } => "too small".to_string(),
        NormalityVerdict::Untestable { .. } => "untestable".to_string(),
        NormalityVerdict::Normal(sw) => format!("W={:.3} p={:.3} kept", sw.w, sw.p_value),
        NormalityVerdict::NotNormal(sw) => format!("W={:.3} p={:.3} dropped", sw.w, sw.p_value),
    }
}

impl fmt::Display for AttributeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} by {}", self.attribute, self.dimension)?;
        writeln!(
            f,
            "  groups: {} formed, {} passed normality",
            self.groups_formed(),
            self.groups_retained()
        )?;
        let width = self.groups.iter().map(|g| g.key.len()).max().unwrap_or(0);
        for g in &self.groups {
            writeln!(
                f,
                "    {:<width$}  n={:<5} mean={:<14.2} {}",
                g.key,
                g.n,
                g.mean,
                verdict_label(&g.normality),
                width = width
            )?;
        }

        let alpha = self.test.anova_alpha;
        match &self.test.outcome {
            TestOutcome::InsufficientGroups { found } => {
                writeln!(f, "  ANOVA: insufficient groups ({} < 2), not tested", found)?;
            }
            TestOutcome::FailToReject { anova } => {
                writeln!(
                    f,
                    "  ANOVA: F={:.4} p={:.4} (alpha {}) -> fail to reject null",
                    anova.f, anova.p_value, alpha
                )?;
            }
            TestOutcome::Reject { anova, posthoc } => {
                writeln!(
                    f,
                    "  ANOVA: F={:.4} p={:.4e} (alpha {}) -> reject null",
                    anova.f, anova.p_value, alpha
                )?;
                for report in posthoc {
                    writeln!(
                        f,
                        "  {} (alpha {}, critical {:.3}): {} of {} pairs differ",
                        report.method,
                        report.alpha,
                        report.critical_value,
                        report.rejected_count(),
                        report.comparisons.len()
                    )?;
                    for c in report.rejected() {
                        writeln!(
                            f,
                            "    {}: diff={:.2} threshold={:.2} p={:.4}",
                            c.pair, c.mean_diff, c.threshold, c.p_value
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Plain text for a batch of reports, blank line between each.
pub fn render_text(reports: &[AttributeReport]) -> String {
    reports
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn to_json(reports: &[AttributeReport]) -> Result<String> {
    Ok(serde_json::to_string_pretty(reports)?)
}
