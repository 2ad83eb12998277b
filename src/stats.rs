//! Summary statistics over request records

use std::collections::BTreeMap;

use serde::Serialize;

use crate::request::RequestResult;

/// Min, max, mean, and upper percentiles of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BasicStats {
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// Arithmetic mean
    pub avg: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
}

/// Computes [`BasicStats`], or `None` for an empty sample.
#[must_use]
pub fn basic_stats(values: &[f64]) -> Option<BasicStats> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    #[allow(clippy::cast_precision_loss)]
    let avg = sorted.iter().sum::<f64>() / sorted.len() as f64;

    Some(BasicStats {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        avg,
        p95: percentile(0.95, &sorted),
        p99: percentile(0.99, &sorted),
    })
}

/// Percentile of an ascending, non-empty sample.
///
/// Uses the rank `p * n - 1`, interpolating linearly between neighbors
/// when it is fractional. Ranks outside the sample are clamped to its ends.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(p: f64, sorted: &[f64]) -> f64 {
    let last = sorted.len() - 1;
    let rank = p.mul_add(sorted.len() as f64, -1.0).clamp(0.0, last as f64);
    let lower = rank.floor() as usize;
    let fraction = rank - rank.floor();

    if fraction == 0.0 || lower == last {
        return sorted[lower];
    }
    (1.0 - fraction).mul_add(sorted[lower], fraction * sorted[lower + 1])
}

/// Counts results by classification.
pub fn tally<'a, I>(results: I) -> BTreeMap<String, u64>
where
    I: IntoIterator<Item = &'a RequestResult>,
{
    let mut counts = BTreeMap::new();
    for result in results {
        *counts.entry(result.to_string()).or_default() += 1;
    }
    counts
}
