//! One-way analysis of variance across groups.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::errors::{distribution_error, AnalysisError, Result};
use crate::grouping::Groups;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnovaResult {
    /// F statistic. Infinite when every group is constant but the means
    /// differ, NaN when every value in every group is equal.
    pub f: f64,
    pub p_value: f64,
    pub df_between: usize,
    pub df_within: usize,
    pub ss_between: f64,
    pub ss_within: f64,
    /// Pooled within-group mean squared error.
    pub mse: f64,
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// One-way ANOVA over every group in `groups`.
///
/// Needs at least two groups and more observations than groups.
pub fn one_way_anova(groups: &Groups) -> Result<AnovaResult> {
    let k = groups.len();
    if k < 2 {
        return Err(AnalysisError::SampleTooSmall {
            test: "one-way ANOVA (groups)",
            size: k,
            min: 2,
        });
    }
    if let Some((_, empty)) = groups.iter().find(|(_, v)| v.is_empty()) {
        return Err(AnalysisError::SampleTooSmall {
            test: "one-way ANOVA (group size)",
            size: empty.len(),
            min: 1,
        });
    }
    let n: usize = groups.values().map(Vec::len).sum();
    if n <= k {
        return Err(AnalysisError::SampleTooSmall {
            test: "one-way ANOVA (observations)",
            size: n,
            min: k + 1,
        });
    }

    let grand_mean = groups.values().flatten().sum::<f64>() / n as f64;
    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for values in groups.values() {
        let m = mean(values);
        ss_between += values.len() as f64 * (m - grand_mean).powi(2);
        ss_within += values.iter().map(|v| (v - m).powi(2)).sum::<f64>();
    }

    let df_between = k - 1;
    let df_within = n - k;
    let ms_between = ss_between / df_between as f64;
    let mse = ss_within / df_within as f64;

    let (f, p_value) = if mse > 0.0 {
        let f = ms_between / mse;
        let dist = FisherSnedecor::new(df_between as f64, df_within as f64).map_err(distribution_error)?;
        (f, dist.sf(f))
    } else if ms_between > 0.0 {
        (f64::INFINITY, 0.0)
    } else {
        (f64::NAN, 1.0)
    };

    Ok(AnovaResult {
        f,
        p_value,
        df_between,
        df_within,
        ss_between,
        ss_within,
        mse,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(data: &[(&str, &[f64])]) -> Groups {
        data.iter().map(|(k, v)| (k.to_string(), v.to_vec())).collect()
    }

    #[test]
    fn test_anova_textbook() {
        // Means 2, 5, 8 with within variance 1 in each group.
        let g = groups(&[
            ("a", &[1.0, 2.0, 3.0]),
            ("b", &[4.0, 5.0, 6.0]),
            ("c", &[7.0, 8.0, 9.0]),
        ]);
        let r = one_way_anova(&g).unwrap();
        assert_eq!(r.df_between, 2);
        assert_eq!(r.df_within, 6);
        assert!((r.ss_between - 54.0).abs() < 1e-9);
        assert!((r.ss_within - 6.0).abs() < 1e-9);
        assert!((r.f - 27.0).abs() < 1e-9);
        // F(2, 6) survival at 27 is (1 + 27/3)^-3 = 0.001.
        assert!((r.p_value - 0.001).abs() < 1e-6);
    }

    #[test]
    fn test_anova_no_difference() {
        let g = groups(&[("a", &[1.0, 2.0, 3.0]), ("b", &[3.0, 2.0, 1.0])]);
        let r = one_way_anova(&g).unwrap();
        assert_eq!(r.f, 0.0);
        assert!((r.p_value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_anova_constant_groups() {
        let differ = groups(&[("a", &[1.0, 1.0]), ("b", &[2.0, 2.0])]);
        let r = one_way_anova(&differ).unwrap();
        assert!(r.f.is_infinite());
        assert_eq!(r.p_value, 0.0);

        let same = groups(&[("a", &[1.0, 1.0]), ("b", &[1.0, 1.0])]);
        let r = one_way_anova(&same).unwrap();
        assert!(r.f.is_nan());
        assert_eq!(r.p_value, 1.0);
    }

    #[test]
    fn test_anova_needs_two_groups() {
        let g = groups(&[("a", &[1.0, 2.0, 3.0])]);
        assert!(matches!(one_way_anova(&g), Err(AnalysisError::SampleTooSmall { .. })));
    }
}
