//! Pairwise post-hoc comparisons after a significant ANOVA.
//!
//! Every unordered pair of groups is compared exactly once. Fisher's LSD
//! uses the pooled MSE with a plain t critical value; Tukey's HSD
//! (Tukey-Kramer for unequal sizes) uses the studentized range
//! distribution, so the two may reject different pairs.

use std::f64::consts::{LN_2, PI, SQRT_2};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::function::erf::erfc;
use statrs::function::gamma::ln_gamma;

use crate::anova::{mean, AnovaResult};
use crate::errors::{distribution_error, AnalysisError, Result};
use crate::grouping::Groups;

// ============================================================================
// Pairs
// ============================================================================

/// An unordered pair of group keys, stored in sorted order so that
/// (A, B) and (B, A) are the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupPair {
    first: String,
    second: String,
}

impl GroupPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn second(&self) -> &str {
        &self.second
    }

    pub fn contains(&self, key: &str) -> bool {
        self.first == key || self.second == key
    }
}

impl fmt::Display for GroupPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vs {}", self.first, self.second)
    }
}

/// Every unordered pair of groups, each once, in key order.
pub fn unordered_pairs(groups: &Groups) -> Vec<(GroupPair, &[f64], &[f64])> {
    let entries: Vec<(&String, &Vec<f64>)> = groups.iter().collect();
    let mut pairs = Vec::with_capacity(entries.len() * entries.len().saturating_sub(1) / 2);
    for (i, (key_a, a)) in entries.iter().enumerate() {
        for (key_b, b) in &entries[i + 1..] {
            pairs.push((GroupPair::new(key_a.as_str(), key_b.as_str()), a.as_slice(), b.as_slice()));
        }
    }
    pairs
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostHocMethod {
    /// Fisher's least significant difference.
    Lsd,
    /// Tukey's honestly significant difference.
    Tukey,
}

impl PostHocMethod {
    pub fn name(self) -> &'static str {
        match self {
            PostHocMethod::Lsd => "Fisher LSD",
            PostHocMethod::Tukey => "Tukey HSD",
        }
    }

    pub fn build(self, alpha: f64) -> Box<dyn PostHocTest> {
        match self {
            PostHocMethod::Lsd => Box::new(FisherLsd::new(alpha)),
            PostHocMethod::Tukey => Box::new(TukeyHsd::new(alpha)),
        }
    }
}

impl fmt::Display for PostHocMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PostHocMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lsd" | "fisher" => Ok(PostHocMethod::Lsd),
            "tukey" | "hsd" => Ok(PostHocMethod::Tukey),
            other => Err(format!("unknown post-hoc method '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairComparison {
    pub pair: GroupPair,
    /// mean(first) - mean(second).
    pub mean_diff: f64,
    /// Smallest |mean_diff| that counts as significant for this pair.
    pub threshold: f64,
    pub p_value: f64,
    pub reject: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostHocReport {
    pub method: PostHocMethod,
    pub alpha: f64,
    /// t (LSD) or q (Tukey) critical value.
    pub critical_value: f64,
    pub comparisons: Vec<PairComparison>,
}

impl PostHocReport {
    pub fn rejected(&self) -> impl Iterator<Item = &PairComparison> {
        self.comparisons.iter().filter(|c| c.reject)
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected().count()
    }

    pub fn get(&self, a: &str, b: &str) -> Option<&PairComparison> {
        let pair = GroupPair::new(a, b);
        self.comparisons.iter().find(|c| c.pair == pair)
    }
}

/// A pairwise comparison procedure run after ANOVA rejects.
pub trait PostHocTest: Send + Sync {
    fn method(&self) -> PostHocMethod;

    fn compare(&self, groups: &Groups, anova: &AnovaResult) -> Result<PostHocReport>;
}

fn validate_alpha(alpha: f64) -> Result<()> {
    if alpha > 0.0 && alpha < 1.0 {
        Ok(())
    } else {
        Err(AnalysisError::Distribution(format!("alpha must be in (0, 1), got {}", alpha)))
    }
}

fn reject_at(abs_diff: f64, threshold: f64) -> bool {
    // A zero threshold (MSE of 0) must not flag identical means.
    abs_diff > 0.0 && abs_diff >= threshold
}

// ============================================================================
// Fisher LSD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FisherLsd {
    pub alpha: f64,
}

impl FisherLsd {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    fn compare_pair(
        &self,
        pair: GroupPair,
        a: &[f64],
        b: &[f64],
        mse: f64,
        t_crit: f64,
        dist: &StudentsT,
    ) -> PairComparison {
        let mean_diff = mean(a) - mean(b);
        let abs_diff = mean_diff.abs();
        let se = (mse * (1.0 / a.len() as f64 + 1.0 / b.len() as f64)).sqrt();
        let threshold = t_crit * se;
        let p_value = if se > 0.0 {
            (2.0 * dist.sf(abs_diff / se)).min(1.0)
        } else if abs_diff > 0.0 {
            0.0
        } else {
            1.0
        };
        PairComparison {
            pair,
            mean_diff,
            threshold,
            p_value,
            reject: reject_at(abs_diff, threshold),
        }
    }
}

impl PostHocTest for FisherLsd {
    fn method(&self) -> PostHocMethod {
        PostHocMethod::Lsd
    }

    fn compare(&self, groups: &Groups, anova: &AnovaResult) -> Result<PostHocReport> {
        validate_alpha(self.alpha)?;
        let dist = StudentsT::new(0.0, 1.0, anova.df_within as f64).map_err(distribution_error)?;
        let t_crit = dist.inverse_cdf(1.0 - self.alpha / 2.0);

        let comparisons = unordered_pairs(groups)
            .into_iter()
            .map(|(pair, a, b)| self.compare_pair(pair, a, b, anova.mse, t_crit, &dist))
            .collect();

        Ok(PostHocReport {
            method: PostHocMethod::Lsd,
            alpha: self.alpha,
            critical_value: t_crit,
            comparisons,
        })
    }
}

// ============================================================================
// Tukey HSD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TukeyHsd {
    pub alpha: f64,
}

impl TukeyHsd {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }
}

impl PostHocTest for TukeyHsd {
    fn method(&self) -> PostHocMethod {
        PostHocMethod::Tukey
    }

    fn compare(&self, groups: &Groups, anova: &AnovaResult) -> Result<PostHocReport> {
        validate_alpha(self.alpha)?;
        let k = groups.len() as f64;
        let df = anova.df_within as f64;
        let q_crit = qtukey(1.0 - self.alpha, k, df)?;

        let mut comparisons = Vec::new();
        for (pair, a, b) in unordered_pairs(groups) {
            let mean_diff = mean(a) - mean(b);
            let abs_diff = mean_diff.abs();
            let se = (anova.mse / 2.0 * (1.0 / a.len() as f64 + 1.0 / b.len() as f64)).sqrt();
            let threshold = q_crit * se;
            let p_value = if se > 0.0 {
                (1.0 - ptukey(abs_diff / se, k, df)?).clamp(0.0, 1.0)
            } else if abs_diff > 0.0 {
                0.0
            } else {
                1.0
            };
            comparisons.push(PairComparison {
                pair,
                mean_diff,
                threshold,
                p_value,
                reject: reject_at(abs_diff, threshold),
            });
        }

        Ok(PostHocReport {
            method: PostHocMethod::Tukey,
            alpha: self.alpha,
            critical_value: q_crit,
            comparisons,
        })
    }
}

// ============================================================================
// Studentized Range Distribution
// ============================================================================

// Gauss-Legendre nodes and weights (half of a symmetric rule).
const XLEG: [f64; 6] = [
    0.981560634246719250690549090149,
    0.904117256370474856678465866119,
    0.769902674194304687036893833213,
    0.587317954286617447296702418941,
    0.367831498998180193752691536644,
    0.125233408511468915472441369464,
];
const ALEG: [f64; 6] = [
    0.047175336386511827194615961485,
    0.106939325995318430960254718194,
    0.160078328543346226334652529543,
    0.203167426723065921749064455810,
    0.233492536538354808760849898925,
    0.249147045813402785000562436043,
];
const XLEGQ: [f64; 8] = [
    0.989400934991649932596154173450,
    0.944575023073232576077988415535,
    0.865631202387831743880467897712,
    0.755404408355003033895101194847,
    0.617876244402643748446671764049,
    0.458016777657227386342419442984,
    0.281603550779258913230460501460,
    0.950125098376374401853193354250e-1,
];
const ALEGQ: [f64; 8] = [
    0.271524594117540948517805724560e-1,
    0.622535239386478928628438369944e-1,
    0.951585116824927848099251076022e-1,
    0.124628971255533872052476282192,
    0.149595988816576732081501730547,
    0.169156519395002538189312079030,
    0.182603415044923588866763667969,
    0.189450610455068496285396723208,
];

fn pnorm(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// P(range of `cc` standard normals < w), raised to `rr` ranges.
fn wprob(w: f64, rr: f64, cc: f64) -> f64 {
    const BB: f64 = 8.0;
    const C1: f64 = -30.0;
    const C3: f64 = 60.0;

    let qsqz = w * 0.5;
    if qsqz >= BB {
        return 1.0;
    }

    let mut pr_w = 2.0 * pnorm(qsqz) - 1.0;
    pr_w = if pr_w >= 1.0 { 1.0 } else { pr_w.powf(cc) };

    let wincr = if w > 3.0 { 2 } else { 3 };
    let binc = (BB - qsqz) / wincr as f64;
    let mut blb = qsqz;
    let mut bub = blb + binc;
    let cc1 = cc - 1.0;
    let cutoff = (C1 / cc1).exp();
    let mut einsum = 0.0;

    for _ in 0..wincr {
        let mut elsum = 0.0;
        let a = 0.5 * (bub + blb);
        let b = 0.5 * (bub - blb);
        for jj in 0..2 * XLEG.len() {
            let (j, xx) = if jj < XLEG.len() {
                (jj, -XLEG[jj])
            } else {
                let j = 2 * XLEG.len() - 1 - jj;
                (j, XLEG[j])
            };
            let ac = a + b * xx;
            let qexpo = ac * ac;
            if qexpo > C3 {
                break;
            }
            let rinsum = pnorm(ac) - pnorm(ac - w);
            if rinsum >= cutoff {
                elsum += ALEG[j] * (-0.5 * qexpo).exp() * rinsum.powf(cc1);
            }
        }
        elsum *= 2.0 * b * cc / (2.0 * PI).sqrt();
        einsum += elsum;
        blb = bub;
        bub += binc;
    }

    pr_w += einsum;
    if pr_w <= (C1 / rr).exp() {
        return 0.0;
    }
    pr_w.powf(rr).min(1.0)
}

/// CDF of the studentized range for `cc` groups and `df` error degrees
/// of freedom.
pub fn ptukey(q: f64, cc: f64, df: f64) -> Result<f64> {
    const RR: f64 = 1.0;
    const EPS1: f64 = -30.0;
    const EPS2: f64 = 1.0e-14;

    if df < 2.0 || cc < 2.0 || q.is_nan() {
        return Err(AnalysisError::Distribution(format!(
            "studentized range needs df >= 2 and k >= 2 (df = {}, k = {})",
            df, cc
        )));
    }
    if q <= 0.0 {
        return Ok(0.0);
    }
    if q.is_infinite() {
        return Ok(1.0);
    }
    if df > 25_000.0 {
        return Ok(wprob(q, RR, cc));
    }

    let f2 = df * 0.5;
    let f21 = f2 - 1.0;
    let ff4 = df * 0.25;
    let ulen: f64 = if df <= 100.0 {
        1.0
    } else if df <= 800.0 {
        0.5
    } else if df <= 5000.0 {
        0.25
    } else {
        0.125
    };
    let f2lf = f2 * df.ln() - df * LN_2 - ln_gamma(f2) + ulen.ln();

    let mut ans = 0.0;
    for i in 1..=50 {
        let mut otsum = 0.0;
        let twa1 = (2 * i - 1) as f64 * ulen;
        for jj in 0..2 * XLEGQ.len() {
            let (j, offset) = if jj < XLEGQ.len() {
                (jj, -XLEGQ[jj] * ulen)
            } else {
                let j = jj - XLEGQ.len();
                (j, XLEGQ[j] * ulen)
            };
            let u = twa1 + offset;
            let t1 = f2lf + f21 * u.ln() - u * ff4;
            if t1 >= EPS1 {
                let qsqz = q * (u * 0.5).sqrt();
                otsum += wprob(qsqz, RR, cc) * ALEGQ[j] * t1.exp();
            }
        }
        if i as f64 * ulen >= 1.0 && otsum <= EPS2 {
            break;
        }
        ans += otsum;
    }
    Ok(ans.min(1.0))
}

/// Quantile of the studentized range, by bisection on [`ptukey`].
pub fn qtukey(p: f64, cc: f64, df: f64) -> Result<f64> {
    if !(p > 0.0 && p < 1.0) {
        return Err(AnalysisError::Distribution(format!("probability must be in (0, 1), got {}", p)));
    }
    let mut lo = 0.0;
    let mut hi = 1.0;
    while ptukey(hi, cc, df)? < p {
        lo = hi;
        hi *= 2.0;
        if hi > 1e6 {
            return Err(AnalysisError::Distribution("studentized range quantile diverged".into()));
        }
    }
    for _ in 0..60 {
        let mid = 0.5 * (lo + hi);
        if ptukey(mid, cc, df)? < p {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-9 {
            break;
        }
    }
    Ok(0.5 * (lo + hi))
}
