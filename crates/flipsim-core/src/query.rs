//! Percentile and backstop queries against stored drawdown samples.
//!
//! Both queries pool `samples` bootstrap resamples of a record's raw data.
//! The pool is never materialized: every draw picks one observation
//! uniformly, so the pool is fully described by how often each observation
//! was drawn. Counts are tallied over the sorted sample, which gives pool
//! ranks and order statistics directly from a prefix sum.

use std::sync::Arc;

use rand::Rng;

use crate::error::QueryError;
use crate::resample::ResamplePlan;
use crate::stats::StatisticsRecord;
use crate::store::ResultStore;

/// Drawdowns are non-positive; a positive magnitude is read as its negation.
pub fn normalize_drawdown(value: f64) -> f64 {
    if value > 0.0 { -value } else { value }
}

/// Bootstrap pool as draw counts over the sorted sample.
#[derive(Debug, Clone)]
pub struct PooledDistribution {
    sorted: Vec<f64>,
    /// `cumulative[i]` = number of pooled draws at or below `sorted[i]`'s rank.
    cumulative: Vec<u64>,
}

impl PooledDistribution {
    /// Build a pool directly from sorted values and their draw counts.
    fn from_counts(sorted: Vec<f64>, counts: &[u64]) -> Self {
        let cumulative = counts
            .iter()
            .scan(0u64, |acc, &c| {
                *acc += c;
                Some(*acc)
            })
            .collect();
        Self { sorted, cumulative }
    }

    /// Number of values in the pool.
    pub fn len(&self) -> u64 {
        self.cumulative.last().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Percentage of pooled values strictly below `x`.
    pub fn percent_below(&self, x: f64) -> f64 {
        let total = self.len();
        if total == 0 {
            return 0.0;
        }
        let idx = self.sorted.partition_point(|&v| v < x);
        let below = if idx == 0 { 0 } else { self.cumulative[idx - 1] };
        100.0 * below as f64 / total as f64
    }

    /// Value at zero-based `rank` of the sorted pool.
    fn value_at(&self, rank: u64) -> f64 {
        let i = self.cumulative.partition_point(|&c| c <= rank);
        self.sorted[i.min(self.sorted.len() - 1)]
    }

    /// Linear-interpolation percentile of the pool, `p` in `[0, 100]`.
    pub fn percentile(&self, p: f64) -> f64 {
        let total = self.len();
        if total == 0 {
            return 0.0;
        }
        let idx = (p / 100.0).clamp(0.0, 1.0) * (total - 1) as f64;
        let lo = idx.floor() as u64;
        let hi = idx.ceil() as u64;
        let low = self.value_at(lo);
        if lo == hi {
            low
        } else {
            let t = idx - lo as f64;
            low * (1.0 - t) + self.value_at(hi) * t
        }
    }
}

/// Pool `samples` resamples of `data.len()` draws each.
pub fn pooled_bootstrap(
    data: &[f64],
    samples: usize,
    plan: &ResamplePlan,
) -> Result<PooledDistribution, QueryError> {
    if data.is_empty() {
        return Err(QueryError::EmptySample);
    }
    if samples == 0 {
        return Err(QueryError::InvalidArgument(
            "bootstrap samples must be at least 1".to_string(),
        ));
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();

    let mut counts = vec![0u64; n];
    for batch in plan.run(samples, |rng, count| {
        let mut local = vec![0u64; n];
        for _ in 0..count * n {
            local[rng.random_range(0..n)] += 1;
        }
        local
    }) {
        for (total, c) in counts.iter_mut().zip(batch) {
            *total += c;
        }
    }

    Ok(PooledDistribution::from_counts(sorted, &counts))
}

/// Percentage of pooled drawdowns strictly below `value`.
pub fn drawdown_percentile(
    data: &[f64],
    value: f64,
    samples: usize,
    plan: &ResamplePlan,
) -> Result<f64, QueryError> {
    if !value.is_finite() {
        return Err(QueryError::InvalidArgument(format!(
            "drawdown {value} is not finite"
        )));
    }
    let pool = pooled_bootstrap(data, samples, plan)?;
    Ok(pool.percent_below(normalize_drawdown(value)))
}

/// Drawdown at `percentile` of the pooled distribution.
pub fn backstop(
    data: &[f64],
    percentile: f64,
    samples: usize,
    plan: &ResamplePlan,
) -> Result<f64, QueryError> {
    if !(0.0..=100.0).contains(&percentile) {
        return Err(QueryError::InvalidPercentile(percentile));
    }
    let pool = pooled_bootstrap(data, samples, plan)?;
    Ok(pool.percentile(percentile))
}

/// Label-addressed queries over a shared store.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    store: Arc<ResultStore>,
    samples: usize,
    plan: ResamplePlan,
}

impl QueryEngine {
    pub fn new(store: Arc<ResultStore>, samples: usize, plan: ResamplePlan) -> Self {
        Self {
            store,
            samples,
            plan,
        }
    }

    fn record(&self, label: &str) -> Result<Arc<StatisticsRecord>, QueryError> {
        self.store
            .get(label)
            .ok_or_else(|| QueryError::LabelNotFound(label.to_string()))
    }

    /// Probability (in percent) of a drawdown worse than `value` for `label`.
    pub fn drawdown_percentile(&self, label: &str, value: f64) -> Result<f64, QueryError> {
        let record = self.record(label)?;
        drawdown_percentile(&record.data, value, self.samples, &self.plan)
    }

    /// Drawdown at `percentile` for `label`.
    pub fn backstop(&self, label: &str, percentile: f64) -> Result<f64, QueryError> {
        let record = self.record(label)?;
        backstop(&record.data, percentile, self.samples, &self.plan)
    }
}
