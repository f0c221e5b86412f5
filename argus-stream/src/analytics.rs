//! Derived analytics over buffered data: aggregate anomaly score, linear
//! trend, and small grouping/filtering helpers.
//!
//! Everything here works on slices copied out of the buffers and registries;
//! nothing mutates stored data or its order.

use crate::types::{MetricPoint, Severity, ThreatAlert};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Baseline for the aggregate anomaly score: uniform activity sits here.
/// Tunable heuristic, as is the division guard below.
pub const ANOMALY_BASELINE: f64 = 0.5;
pub const ANOMALY_EPSILON: f64 = 1e-6;

/// Aggregate anomaly over current entity activity levels. A spike well above
/// the mean pushes the score toward 1; uniform activity stays at the
/// baseline. Empty input scores 0.
pub fn anomaly_score(levels: &[f64]) -> f64 {
    if levels.is_empty() {
        return 0.0;
    }
    let mean = levels.iter().sum::<f64>() / levels.len() as f64;
    let max = levels.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let score = ANOMALY_BASELINE + (max - mean) / mean.max(ANOMALY_EPSILON);
    score.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// Ordinary least-squares fit of a series against its sample index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub slope: f64,
    pub intercept: f64,
    pub direction: TrendDirection,
    pub strength: f64,
}

/// OLS linear regression of `values` against index 0..n. Needs at least two
/// samples; with fewer there is no trend, which is distinct from a zero one.
/// `direction` is `Stable` only for an exactly zero slope.
pub fn linear_trend(values: &[f64]) -> Option<Trend> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let sum_x: f64 = (0..n).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..n).map(|i| (i as f64) * (i as f64)).sum();

    let denom = n_f * sum_x2 - sum_x * sum_x;
    if denom == 0.0 {
        return None;
    }
    let slope = (n_f * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n_f;

    let direction = if slope > 0.0 {
        TrendDirection::Increasing
    } else if slope < 0.0 {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    Some(Trend {
        slope,
        intercept,
        direction,
        strength: slope.abs(),
    })
}

/// Extract one numeric field from a metric series, oldest → newest.
pub fn field_series<F>(points: &[MetricPoint], field: F) -> Vec<f64>
where
    F: Fn(&MetricPoint) -> f64,
{
    points.iter().map(field).collect()
}

/// Trend of one numeric field across a metric series.
pub fn trend_of<F>(points: &[MetricPoint], field: F) -> Option<Trend>
where
    F: Fn(&MetricPoint) -> f64,
{
    linear_trend(&field_series(points, field))
}

/// Alert counts grouped by severity.
pub fn severity_counts(alerts: &[ThreatAlert]) -> BTreeMap<Severity, usize> {
    let mut counts = BTreeMap::new();
    for alert in alerts {
        *counts.entry(alert.severity).or_insert(0) += 1;
    }
    counts
}

/// Points at or after the cutoff, order preserved.
pub fn points_since(points: &[MetricPoint], cutoff: DateTime<Utc>) -> Vec<MetricPoint> {
    points.iter().filter(|p| p.at >= cutoff).cloned().collect()
}
