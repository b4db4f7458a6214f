//! Scalar comparison report and reward curve export.

use crate::error::{HarnessError, write_json};
use gaitlab_proto::{EvalSummary, TrainingPoint};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Summary statistics for one run, written to `comparison.json`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub reward_mean: f64,
    /// Population variance (divides by N); 0 with fewer than two samples.
    pub reward_variance: f64,
    /// Last reward in emission order.
    pub reward_final: f64,
    pub success_rate_mean: f64,
    /// Wall-clock duration of the primary training invocation.
    pub wall_clock_seconds: f64,
}

impl ComparisonReport {
    /// Aggregates a reward series and evaluation summaries.
    ///
    /// Empty inputs yield zeros rather than NaN.
    pub fn build(points: &[TrainingPoint], evals: &[EvalSummary], wall_clock_seconds: f64) -> Self {
        let rewards: Vec<f64> = points.iter().map(|p| p.avg_tuple_reward).collect();
        let successes: Vec<f64> = evals.iter().map(|e| e.success_rate).collect();
        Self {
            reward_mean: mean(&rewards),
            reward_variance: population_variance(&rewards),
            reward_final: rewards.last().copied().unwrap_or(0.0),
            success_rate_mean: mean(&successes),
            wall_clock_seconds,
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<(), HarnessError> {
        write_json(path, self)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population variance of `values`; exactly 0 for fewer than two samples.
pub fn population_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

/// Writes `iteration,avg_tuple_reward` CSV rows in emission order.
pub fn write_reward_curve(points: &[TrainingPoint], path: &Path) -> Result<(), HarnessError> {
    let mut out = String::from("iteration,avg_tuple_reward\n");
    for point in points {
        let _ = writeln!(out, "{},{}", point.iteration, point.avg_tuple_reward);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| HarnessError::io(parent, e))?;
    }
    std::fs::write(path, out).map_err(|e| HarnessError::io(path, e))
}
