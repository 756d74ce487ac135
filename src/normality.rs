//! Shapiro-Wilk normality screening of groups.
//!
//! W and its p-value follow Royston's AS R94 algorithm, valid for
//! 3 <= n <= 5000. Only groups the test cannot reject at the configured
//! alpha survive into ANOVA.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::debug;

use crate::errors::{distribution_error, AnalysisError, Result};
use crate::grouping::Groups;

/// Groups need at least this many members to be tested at all.
pub const NORMALITY_MIN_SAMPLE: usize = 6;

/// Default significance level for rejecting normality.
pub const DEFAULT_NORMALITY_ALPHA: f64 = 0.05;

const SW_MIN: usize = 3;
const SW_MAX: usize = 5000;

// AS R94 polynomial coefficients
const C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.07119, 4.434685, -2.706056];
const C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];
const C3: [f64; 4] = [0.544, -0.39978, 0.025054, -6.714e-4];
const C4: [f64; 4] = [1.3822, -0.77857, 0.062767, -0.0020322];
const C5: [f64; 4] = [-1.5861, -0.31082, -0.083751, 0.0038915];
const C6: [f64; 3] = [-0.4803, -0.082676, 0.0030302];
const G: [f64; 2] = [-2.273, 0.459];

const SMALL: f64 = 1e-19;

fn poly(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShapiroWilk {
    pub w: f64,
    pub p_value: f64,
    pub n: usize,
}

/// Half-sample weights a_1..a_{n/2}, largest first.
fn sw_coefficients(n: usize, std_normal: &Normal) -> Vec<f64> {
    let half = n / 2;
    if n == 3 {
        return vec![0.5f64.sqrt()];
    }
    let an25 = n as f64 + 0.25;
    let m: Vec<f64> = (0..half)
        .map(|i| -std_normal.inverse_cdf((i as f64 + 1.0 - 0.375) / an25))
        .collect();
    let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
    let ssumm2 = summ2.sqrt();
    let rsn = 1.0 / (n as f64).sqrt();

    let mut a = vec![0.0; half];
    let a1 = m[0] / ssumm2 + poly(&C1, rsn);
    a[0] = a1;

    let (start, fac) = if n > 5 {
        let a2 = m[1] / ssumm2 + poly(&C2, rsn);
        a[1] = a2;
        let num = summ2 - 2.0 * m[0].powi(2) - 2.0 * m[1].powi(2);
        let den = 1.0 - 2.0 * a1.powi(2) - 2.0 * a2.powi(2);
        (2, (num / den).sqrt())
    } else {
        let num = summ2 - 2.0 * m[0].powi(2);
        let den = 1.0 - 2.0 * a1.powi(2);
        (1, (num / den).sqrt())
    };
    for i in start..half {
        a[i] = m[i] / fac;
    }
    a
}

/// Shapiro-Wilk test of `sample` against normality.
///
/// Fails for samples outside 3..=5000 or whose values are all equal.
pub fn shapiro_wilk(sample: &[f64]) -> Result<ShapiroWilk> {
    let n = sample.len();
    if n < SW_MIN {
        return Err(AnalysisError::SampleTooSmall {
            test: "Shapiro-Wilk",
            size: n,
            min: SW_MIN,
        });
    }
    if n > SW_MAX {
        return Err(AnalysisError::DegenerateSample {
            test: "Shapiro-Wilk",
            reason: "more than 5000 observations",
        });
    }

    let mut x = sample.to_vec();
    x.sort_by(f64::total_cmp);
    let range = x[n - 1] - x[0];
    if !range.is_finite() || range < SMALL {
        return Err(AnalysisError::DegenerateSample {
            test: "Shapiro-Wilk",
            reason: "all values are equal",
        });
    }

    let std_normal = Normal::new(0.0, 1.0).map_err(distribution_error)?;
    let a = sw_coefficients(n, &std_normal);

    // Scale by the range to keep the sums well conditioned.
    let scaled: Vec<f64> = x.iter().map(|v| (v - x[0]) / range).collect();
    let mean = scaled.iter().sum::<f64>() / n as f64;
    let ssq: f64 = scaled.iter().map(|v| (v - mean).powi(2)).sum();
    let b: f64 = a
        .iter()
        .enumerate()
        .map(|(i, ai)| ai * (scaled[n - 1 - i] - scaled[i]))
        .sum();
    let w = (b * b / ssq).min(1.0);

    let p_value = sw_p_value(w, n)?;
    Ok(ShapiroWilk { w, p_value, n })
}

fn sw_p_value(w: f64, n: usize) -> Result<f64> {
    if n == 3 {
        let p = 6.0 / PI * ((w.sqrt()).asin() - PI / 3.0);
        return Ok(p.clamp(0.0, 1.0));
    }
    if w >= 1.0 {
        return Ok(1.0);
    }

    let w1 = (1.0 - w).ln();
    let an = n as f64;
    let (y, m, s) = if n <= 11 {
        let gamma = poly(&G, an);
        if w1 >= gamma {
            return Ok(1e-99);
        }
        (-(gamma - w1).ln(), poly(&C3, an), poly(&C4, an).exp())
    } else {
        let xx = an.ln();
        (w1, poly(&C5, xx), poly(&C6, xx).exp())
    };

    let tail = Normal::new(m, s).map_err(distribution_error)?;
    Ok(tail.sf(y))
}

// ============================================================================
// Filter
// ============================================================================

/// Per-group outcome of the normality screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NormalityVerdict {
    /// Too few members to test.
    TooSmall { n: usize },
    /// Zero range or otherwise untestable.
    Untestable { n: usize },
    Normal(ShapiroWilk),
    NotNormal(ShapiroWilk),
}

impl NormalityVerdict {
    pub fn is_retained(&self) -> bool {
        matches!(self, NormalityVerdict::Normal(_))
    }
}

/// Screen one group.
pub fn assess(values: &[f64], alpha: f64) -> NormalityVerdict {
    let n = values.len();
    if n < NORMALITY_MIN_SAMPLE {
        return NormalityVerdict::TooSmall { n };
    }
    match shapiro_wilk(values) {
        Ok(sw) if sw.p_value > alpha => NormalityVerdict::Normal(sw),
        Ok(sw) => NormalityVerdict::NotNormal(sw),
        Err(e) => {
            debug!(n, error = %e, "normality test skipped");
            NormalityVerdict::Untestable { n }
        }
    }
}

/// Keep the groups whose Shapiro-Wilk p-value exceeds 0.05.
pub fn keep_normal(groups: &Groups) -> Groups {
    keep_normal_with_alpha(groups, DEFAULT_NORMALITY_ALPHA)
}

pub fn keep_normal_with_alpha(groups: &Groups, alpha: f64) -> Groups {
    screen(groups, alpha).0
}

/// Retained groups plus the verdict for every input group.
pub fn screen(groups: &Groups, alpha: f64) -> (Groups, BTreeMap<String, NormalityVerdict>) {
    let mut kept = Groups::new();
    let mut verdicts = BTreeMap::new();
    for (key, values) in groups {
        let verdict = assess(values, alpha);
        if verdict.is_retained() {
            kept.insert(key.clone(), values.clone());
        }
        verdicts.insert(key.clone(), verdict);
    }
    debug!(before = groups.len(), after = kept.len(), alpha, "normality screen");
    (kept, verdicts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_shapiro_wilk_reference_values() {
        let data = [148.0, 154.0, 158.0, 160.0, 161.0, 162.0, 166.0, 170.0, 182.0, 195.0, 236.0];
        let sw = shapiro_wilk(&data).unwrap();
        assert!(close(sw.w, 0.7888, 1e-3), "w = {}", sw.w);
        assert!(close(sw.p_value, 0.0067, 5e-4), "p = {}", sw.p_value);
    }

    #[test]
    fn test_shapiro_wilk_three_points() {
        let sw = shapiro_wilk(&[1.0, 2.0, 4.0]).unwrap();
        assert!(close(sw.w, 0.9643, 1e-3));
        assert!(close(sw.p_value, 0.6369, 1e-3));
    }

    #[test]
    fn test_shapiro_wilk_order_independent() {
        let a = shapiro_wilk(&[2.1, 3.4, 1.9, 5.6, 4.4, 3.3, 2.8, 3.9, 4.1, 3.0]).unwrap();
        let b = shapiro_wilk(&[5.6, 1.9, 3.0, 4.4, 2.1, 4.1, 3.3, 3.9, 2.8, 3.4]).unwrap();
        assert!(close(a.w, b.w, 1e-12));
        assert!(a.p_value > 0.5);
    }

    #[test]
    fn test_shapiro_wilk_rejects_outlier() {
        let sw = shapiro_wilk(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 100.0]).unwrap();
        assert!(sw.p_value < 0.001);
    }

    #[test]
    fn test_shapiro_wilk_degenerate() {
        assert!(matches!(
            shapiro_wilk(&[1.0, 2.0]),
            Err(AnalysisError::SampleTooSmall { .. })
        ));
        assert!(matches!(
            shapiro_wilk(&[4.0; 8]),
            Err(AnalysisError::DegenerateSample { .. })
        ));
    }

    #[test]
    fn test_keep_normal_drops_small_groups() {
        let mut groups = Groups::new();
        groups.insert("five".into(), vec![100.0, 102.0, 98.0, 101.0, 99.0]);
        groups.insert("eight".into(), vec![100.0, 102.0, 98.0, 101.0, 99.0, 103.0, 97.0, 100.0]);
        groups.insert("skewed".into(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 100.0]);
        groups.insert("flat".into(), vec![3.0; 7]);

        let kept = keep_normal(&groups);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept["eight"], groups["eight"]);
    }

    #[test]
    fn test_assess_verdicts() {
        assert_eq!(assess(&[1.0; 3], 0.05), NormalityVerdict::TooSmall { n: 3 });
        assert_eq!(assess(&[1.0; 6], 0.05), NormalityVerdict::Untestable { n: 6 });
    }

    #[test]
    fn test_screen_reports_every_group() {
        let mut groups = Groups::new();
        groups.insert("small".into(), vec![1.0, 2.0, 3.0]);
        groups.insert("ok".into(), vec![100.0, 102.0, 98.0, 101.0, 99.0, 103.0, 97.0, 100.0]);
        let (kept, verdicts) = screen(&groups, DEFAULT_NORMALITY_ALPHA);
        assert_eq!(kept.len(), 1);
        assert_eq!(verdicts.len(), 2);
        assert!(verdicts["ok"].is_retained());
        assert_eq!(verdicts["small"], NormalityVerdict::TooSmall { n: 3 });
    }
}
