//! Milestone gate for retiring the legacy backend.
//!
//! Four checks run in a fixed order, each toggled by `MilestoneConfig`:
//! 1. Inference parity: legacy and modern sweeps agree within tolerance.
//! 2. Single-step sanity: the training log shows loss going down and
//!    gradients flowing.
//! 3. Short-horizon sanity: a fresh, short training run finishes and emits
//!    rewards. A crash here is recorded, never raised.
//! 4. Benchmark-matrix readiness: the full matrix is configured and this run
//!    produced evaluation evidence.
//!
//! A failed check does not stop later checks. The aggregate verdict is the
//! AND of every check present in the report; disabled checks are absent.

use crate::config::ExperimentConfig;
use crate::error::{HarnessError, write_json};
use crate::eval_sweep::EvalSweepRunner;
use crate::log_parser::LogParser;
use crate::process::{InvocationOutcome, ProcessExecutor};
use crate::runner::{checkpoint_file_name, training_arguments};
use gaitlab_proto::{EvalSummary, PolicyBackend};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const INFERENCE_PARITY: &str = "milestone_1_inference_parity";
pub const SINGLE_STEP_SANITY: &str = "milestone_2_single_step_sanity";
pub const SHORT_HORIZON_SANITY: &str = "milestone_3_short_horizon_sanity";
pub const FULL_BENCHMARK_MATRIX: &str = "milestone_4_full_benchmark_matrix";

/// Subdirectory of the run directory used by the short-horizon check.
pub const SHORT_HORIZON_DIR: &str = "short_horizon";

/// Subdirectory of the run directory holding the two parity sweeps.
pub const PARITY_DIR: &str = "parity";

/// Per-terrain parity deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainParity {
    pub terrain: String,
    pub success_rate_delta: f64,
    pub avg_dist_delta: f64,
    pub within_tolerance: bool,
}

/// Milestone 1: legacy and modern backends agree on every terrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityResult {
    pub passed: bool,
    pub tolerance: f64,
    pub legacy_results: usize,
    pub modern_results: usize,
    /// The sweeps returned different numbers of results.
    pub length_mismatch: bool,
    pub max_success_rate_delta: f64,
    pub max_avg_dist_delta: f64,
    /// Deltas for the terrains both sweeps covered, paired by position.
    pub terrains: Vec<TerrainParity>,
}

impl ParityResult {
    /// Compares two sweeps positionally.
    ///
    /// Pairing stops at the shorter sweep, and any length difference fails
    /// the check.
    pub fn compare(legacy: &[EvalSummary], modern: &[EvalSummary], tolerance: f64) -> Self {
        let terrains: Vec<TerrainParity> = legacy
            .iter()
            .zip(modern)
            .map(|(l, m)| {
                let success_rate_delta = (l.success_rate - m.success_rate).abs();
                let avg_dist_delta = (l.avg_dist - m.avg_dist).abs();
                TerrainParity {
                    terrain: l.terrain.clone(),
                    success_rate_delta,
                    avg_dist_delta,
                    within_tolerance: success_rate_delta <= tolerance
                        && avg_dist_delta <= tolerance,
                }
            })
            .collect();

        let length_mismatch = legacy.len() != modern.len();
        let passed = !length_mismatch && terrains.iter().all(|t| t.within_tolerance);
        let max_of = |f: fn(&TerrainParity) -> f64| terrains.iter().map(f).fold(0.0_f64, f64::max);

        Self {
            passed,
            tolerance,
            legacy_results: legacy.len(),
            modern_results: modern.len(),
            length_mismatch,
            max_success_rate_delta: max_of(|t| t.success_rate_delta),
            max_avg_dist_delta: max_of(|t| t.avg_dist_delta),
            terrains,
        }
    }
}

/// Milestone 2: loss decreased and gradients are non-zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleStepResult {
    pub passed: bool,
    pub loss_samples: usize,
    pub first_loss: Option<f64>,
    pub last_loss: Option<f64>,
    pub loss_decreased: bool,
    pub gradient_samples: usize,
    pub nonzero_gradients: usize,
    pub min_nonzero_gradients: usize,
}

impl SingleStepResult {
    pub fn evaluate(losses: &[f64], grad_norms: &[f64], min_nonzero_gradients: usize) -> Self {
        let first_loss = losses.first().copied();
        let last_loss = losses.last().copied();
        let loss_decreased = match (first_loss, last_loss) {
            (Some(first), Some(last)) if losses.len() >= 2 => last < first,
            _ => false,
        };
        let nonzero_gradients = grad_norms.iter().filter(|g| **g != 0.0).count();

        Self {
            passed: loss_decreased && nonzero_gradients >= min_nonzero_gradients,
            loss_samples: losses.len(),
            first_loss,
            last_loss,
            loss_decreased,
            gradient_samples: grad_norms.len(),
            nonzero_gradients,
            min_nonzero_gradients,
        }
    }
}

/// Milestone 3: a short training run completes and reports rewards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortHorizonResult {
    pub passed: bool,
    pub crashed: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub iterations: u64,
    pub training_points: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crash_reason: Option<String>,
}

impl ShortHorizonResult {
    pub fn from_outcome(outcome: &InvocationOutcome, iterations: u64, training_points: usize) -> Self {
        let (crashed, timed_out, crash_reason) = match outcome {
            InvocationOutcome::Completed(report) => (false, report.timed_out, None),
            InvocationOutcome::Crashed {
                timed_out, reason, ..
            } => (true, *timed_out, Some(reason.clone())),
        };
        Self {
            passed: !crashed && training_points > 0,
            crashed,
            exit_code: outcome.exit_code(),
            timed_out,
            iterations,
            training_points,
            crash_reason,
        }
    }
}

/// Milestone 4: the wider benchmark pass is configured and has evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixReadinessResult {
    pub passed: bool,
    pub enabled: bool,
    pub eval_summaries: usize,
}

impl MatrixReadinessResult {
    pub fn evaluate(enabled: bool, eval_summaries: usize) -> Self {
        Self {
            passed: enabled && eval_summaries > 0,
            enabled,
            eval_summaries,
        }
    }
}

/// Aggregate legacy-removal verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRemovalGate {
    pub can_remove_legacy_mode: bool,
    /// Retiring the legacy backend always requires a documentation update.
    pub requires_docs_update: bool,
    /// Names of the present milestones that failed.
    pub blocking: Vec<String>,
}

impl LegacyRemovalGate {
    /// AND over every milestone present in `report`.
    pub fn evaluate(report: &MilestoneReport) -> Self {
        let blocking: Vec<String> = report
            .entries()
            .into_iter()
            .filter(|(_, passed)| !passed)
            .map(|(name, _)| name.to_string())
            .collect();
        Self {
            can_remove_legacy_mode: blocking.is_empty(),
            requires_docs_update: true,
            blocking,
        }
    }
}

impl Default for LegacyRemovalGate {
    fn default() -> Self {
        Self {
            can_remove_legacy_mode: true,
            requires_docs_update: true,
            blocking: Vec::new(),
        }
    }
}

/// Everything written to `milestones.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MilestoneReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_1_inference_parity: Option<ParityResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_2_single_step_sanity: Option<SingleStepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_3_short_horizon_sanity: Option<ShortHorizonResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_4_full_benchmark_matrix: Option<MatrixReadinessResult>,
    pub legacy_removal_gate: LegacyRemovalGate,
}

impl MilestoneReport {
    /// `(name, passed)` for every milestone present, in evaluation order.
    pub fn entries(&self) -> Vec<(&'static str, bool)> {
        let mut entries = Vec::with_capacity(4);
        if let Some(r) = &self.milestone_1_inference_parity {
            entries.push((INFERENCE_PARITY, r.passed));
        }
        if let Some(r) = &self.milestone_2_single_step_sanity {
            entries.push((SINGLE_STEP_SANITY, r.passed));
        }
        if let Some(r) = &self.milestone_3_short_horizon_sanity {
            entries.push((SHORT_HORIZON_SANITY, r.passed));
        }
        if let Some(r) = &self.milestone_4_full_benchmark_matrix {
            entries.push((FULL_BENCHMARK_MATRIX, r.passed));
        }
        entries
    }

    /// Recomputes `legacy_removal_gate` from the milestone entries.
    pub fn finalize(mut self) -> Self {
        self.legacy_removal_gate = LegacyRemovalGate::evaluate(&self);
        self
    }

    /// True when the stored gate matches a recomputation from the entries.
    pub fn gate_is_consistent(&self) -> bool {
        self.legacy_removal_gate == LegacyRemovalGate::evaluate(self)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), HarnessError> {
        write_json(path, self)
    }

    /// Loads a persisted report.
    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HarnessError::MissingArtifact(path.to_path_buf()));
            }
            Err(e) => return Err(HarnessError::io(path, e)),
        };
        serde_json::from_str(&text).map_err(|e| HarnessError::malformed(path, e))
    }
}

/// Run-specific inputs to the gate.
#[derive(Debug, Clone, Copy)]
pub struct GateInputs<'a> {
    pub run_dir: &'a Path,
    /// Checkpoint produced by the primary training run.
    pub checkpoint: &'a Path,
    /// Log of the primary training run.
    pub train_log: &'a Path,
    /// Number of evaluation summaries the primary sweep produced.
    pub eval_summaries: usize,
}

/// Runs the enabled milestones for one run.
#[derive(Debug, Clone, Copy)]
pub struct MilestoneGate<'a> {
    config: &'a ExperimentConfig,
    executor: &'a ProcessExecutor,
}

impl<'a> MilestoneGate<'a> {
    pub fn new(config: &'a ExperimentConfig, executor: &'a ProcessExecutor) -> Self {
        Self { config, executor }
    }

    /// Evaluates every enabled milestone in order and computes the verdict.
    ///
    /// Errors from the parity sweeps and from reading the primary training
    /// log propagate. A short-horizon crash does not.
    pub async fn evaluate(&self, inputs: GateInputs<'_>) -> Result<MilestoneReport, HarnessError> {
        let settings = &self.config.milestones;
        let mut report = MilestoneReport::default();

        if settings.enable_parity_check {
            let result = self.inference_parity(inputs).await?;
            log_outcome(INFERENCE_PARITY, result.passed);
            report.milestone_1_inference_parity = Some(result);
        }

        if settings.enable_single_step_sanity {
            let parsed = LogParser::new().parse_file(inputs.train_log)?;
            let result = SingleStepResult::evaluate(
                &parsed.losses,
                &parsed.grad_norms,
                settings.min_nonzero_gradients,
            );
            log_outcome(SINGLE_STEP_SANITY, result.passed);
            report.milestone_2_single_step_sanity = Some(result);
        }

        if settings.enable_short_horizon_sanity {
            let result = self.short_horizon(inputs.run_dir).await?;
            log_outcome(SHORT_HORIZON_SANITY, result.passed);
            report.milestone_3_short_horizon_sanity = Some(result);
        }

        // Readiness is only reported when the matrix pass is configured.
        if settings.enable_full_benchmark_matrix {
            let result = MatrixReadinessResult::evaluate(true, inputs.eval_summaries);
            log_outcome(FULL_BENCHMARK_MATRIX, result.passed);
            report.milestone_4_full_benchmark_matrix = Some(result);
        }

        let report = report.finalize();
        info!(
            can_remove_legacy_mode = report.legacy_removal_gate.can_remove_legacy_mode,
            blocking = ?report.legacy_removal_gate.blocking,
            "Legacy removal gate evaluated"
        );
        Ok(report)
    }

    async fn inference_parity(&self, inputs: GateInputs<'_>) -> Result<ParityResult, HarnessError> {
        let sweeps = EvalSweepRunner::new(self.config, self.executor);
        let parity_dir = inputs.run_dir.join(PARITY_DIR);

        let legacy = sweeps
            .run(
                inputs.checkpoint,
                PolicyBackend::LegacyCaffe,
                &parity_dir.join(PolicyBackend::LegacyCaffe.as_str()),
            )
            .await?;
        let modern = sweeps
            .run(
                inputs.checkpoint,
                PolicyBackend::Modern,
                &parity_dir.join(PolicyBackend::Modern.as_str()),
            )
            .await?;

        let result =
            ParityResult::compare(&legacy, &modern, self.config.milestones.parity_tolerance);
        if result.length_mismatch {
            warn!(
                legacy = result.legacy_results,
                modern = result.modern_results,
                "Parity sweeps returned different result counts"
            );
        }
        Ok(result)
    }

    async fn short_horizon(&self, run_dir: &Path) -> Result<ShortHorizonResult, HarnessError> {
        let iterations = self.config.milestones.short_horizon_iters;
        let dir = run_dir.join(SHORT_HORIZON_DIR);
        let paths = ShortHorizonPaths::new(&dir, self.config);

        let args = training_arguments(self.config, &paths.checkpoint, iterations);
        args.write_to(&paths.args)?;

        let outcome = self
            .executor
            .execute_tolerant("short-horizon training", &paths.args, &paths.log)
            .await;

        let training_points = match (&outcome, LogParser::new().parse_file(&paths.log)) {
            (_, Ok(parsed)) => parsed.points.len(),
            // A crashed process may never have produced a log.
            (InvocationOutcome::Crashed { .. }, Err(_)) => 0,
            (InvocationOutcome::Completed(_), Err(e)) => return Err(e),
        };

        Ok(ShortHorizonResult::from_outcome(&outcome, iterations, training_points))
    }
}

/// Files of the short-horizon training run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortHorizonPaths {
    pub args: PathBuf,
    pub log: PathBuf,
    pub checkpoint: PathBuf,
}

impl ShortHorizonPaths {
    pub fn new(dir: &Path, config: &ExperimentConfig) -> Self {
        Self {
            args: dir.join("train_args.txt"),
            log: dir.join("train.log"),
            checkpoint: dir.join(checkpoint_file_name(config)),
        }
    }
}

fn log_outcome(milestone: &str, passed: bool) {
    if passed {
        info!(milestone, "Milestone passed");
    } else {
        warn!(milestone, "Milestone failed");
    }
}
