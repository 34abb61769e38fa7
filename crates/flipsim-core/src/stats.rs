//! Descriptive statistics and bootstrap confidence intervals over a drawdown sample.
//!
//! Percentiles use linear interpolation between closest ranks: the `q`
//! quantile of `n` sorted values sits at fractional index `q * (n - 1)`.
//! Reported figures are rounded to 2 decimals; the raw sample is kept
//! unrounded for later percentile/backstop queries.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::error::StatsError;
use crate::resample::ResamplePlan;

/// Lower and upper bound of a bootstrap confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

/// Summary of one wager's drawdown sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsRecord {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// 5th percentile.
    pub lowest_5pct: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub mean_ci: ConfidenceInterval,
    pub median_ci: ConfidenceInterval,
    /// Number of simulations in `data`.
    pub simulations: usize,
    /// Set when the run stopped early and `data` covers fewer simulations than requested.
    pub partial: bool,
    /// Unrounded drawdown per simulation.
    pub data: Vec<f64>,
}

impl StatisticsRecord {
    /// Display rows in report order.
    pub fn summary_rows(&self) -> [(&'static str, f64); 11] {
        [
            ("mean", self.mean),
            ("min", self.min),
            ("max", self.max),
            ("Lowest 5%", self.lowest_5pct),
            ("Q1", self.q1),
            ("Median", self.median),
            ("Q3", self.q3),
            ("CI_lower_mean", self.mean_ci.lower),
            ("CI_upper_mean", self.mean_ci.upper),
            ("CI_lower_median", self.median_ci.lower),
            ("CI_upper_median", self.median_ci.upper),
        ]
    }
}

/// Compute descriptive statistics and bootstrap intervals for the mean and median.
///
/// The two intervals are bootstrapped independently, each from
/// `bootstrap_samples` resamples of the full sample size drawn with
/// replacement. A one-element sample is valid: every figure collapses to that
/// value.
pub fn compute_statistics(
    sample: &[f64],
    bootstrap_samples: usize,
    confidence: f64,
    plan: &ResamplePlan,
) -> Result<StatisticsRecord, StatsError> {
    if sample.is_empty() {
        return Err(StatsError::EmptySample);
    }
    if let Some(index) = sample.iter().position(|v| !v.is_finite()) {
        return Err(StatsError::NonFinite { index });
    }
    if bootstrap_samples == 0 {
        return Err(StatsError::InvalidParameter(
            "bootstrap_samples must be at least 1".to_string(),
        ));
    }
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(StatsError::InvalidParameter(format!(
            "confidence {confidence} is outside (0, 1)"
        )));
    }

    let mut sorted = sample.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mean_ci = bootstrap_interval(sample, bootstrap_samples, confidence, &plan.fork(0), mean_of);
    let median_ci = bootstrap_interval(
        sample,
        bootstrap_samples,
        confidence,
        &plan.fork(1),
        median_in_place,
    );

    Ok(StatisticsRecord {
        mean: round2(Statistics::mean(sample.iter())),
        min: round2(Statistics::min(sample.iter())),
        max: round2(Statistics::max(sample.iter())),
        lowest_5pct: round2(quantile_sorted(&sorted, 0.05)),
        q1: round2(quantile_sorted(&sorted, 0.25)),
        median: round2(quantile_sorted(&sorted, 0.50)),
        q3: round2(quantile_sorted(&sorted, 0.75)),
        mean_ci: ConfidenceInterval {
            lower: round2(mean_ci.lower),
            upper: round2(mean_ci.upper),
        },
        median_ci: ConfidenceInterval {
            lower: round2(median_ci.lower),
            upper: round2(median_ci.upper),
        },
        simulations: sample.len(),
        partial: false,
        data: sample.to_vec(),
    })
}

/// Percentile bootstrap: resample, apply `estimator`, take the central
/// `confidence` band of the estimator distribution.
fn bootstrap_interval(
    sample: &[f64],
    bootstrap_samples: usize,
    confidence: f64,
    plan: &ResamplePlan,
    estimator: fn(&mut [f64]) -> f64,
) -> ConfidenceInterval {
    use rand::Rng;

    let n = sample.len();
    let mut estimates: Vec<f64> = plan
        .run(bootstrap_samples, |rng, count| {
            let mut resample = vec![0.0f64; n];
            let mut out = Vec::with_capacity(count);
            for _ in 0..count {
                for slot in resample.iter_mut() {
                    *slot = sample[rng.random_range(0..n)];
                }
                out.push(estimator(&mut resample));
            }
            out
        })
        .into_iter()
        .flatten()
        .collect();
    estimates.sort_by(f64::total_cmp);

    ConfidenceInterval {
        lower: quantile_sorted(&estimates, (1.0 - confidence) / 2.0),
        upper: quantile_sorted(&estimates, (1.0 + confidence) / 2.0),
    }
}

fn mean_of(values: &mut [f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median by selection; reorders `values`.
fn median_in_place(values: &mut [f64]) -> f64 {
    let n = values.len();
    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    let upper = *upper;
    if n % 2 == 1 {
        upper
    } else {
        let below = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (below + upper) / 2.0
    }
}

/// Linear-interpolation quantile of already-sorted values, `q` in `[0, 1]`.
///
/// Returns 0.0 for an empty slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let q = q.clamp(0.0, 1.0);
    let idx = q * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let t = idx - lo as f64;
        sorted[lo] * (1.0 - t) + sorted[hi] * t
    }
}

/// Linear-interpolation percentile, `p` in `[0, 100]`, of unsorted values.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, p / 100.0)
}

/// Round to 2 decimal places, halves to even.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round_ties_even() / 100.0
}
