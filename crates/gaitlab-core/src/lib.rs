//! # gaitlab-core
//!
//! Core orchestration for the gaitlab migration harness.
//!
//! This crate provides:
//! - Experiment configuration loading, validation and snapshots
//! - Run directory allocation and simulator argument files
//! - Blocking simulator execution through an injected `ProcessRunner`
//! - Training-log parsing into reward, loss and gradient-norm series
//! - Evaluation sweeps, comparison reports and the four-stage milestone gate
//! - The artifact manifest returned by every run
//! - The benchmark matrix driver that re-invokes the harness per variant
//! - The one-time conversion of legacy policy assets

mod arg_file;
mod architecture;
mod benchmark_matrix;
mod comparison;
mod config;
mod error;
mod eval_sweep;
mod legacy_conversion;
mod log_parser;
mod manifest;
pub mod milestones;
mod process;
mod run_dir;
mod runner;
pub mod testing;

pub use arg_file::ArgumentSet;
pub use architecture::{ensure_templates_exist, resolve_template};
pub use benchmark_matrix::{BenchmarkMatrix, MatrixEntry};
pub use comparison::{ComparisonReport, population_variance, write_reward_curve};
pub use config::{
    ArchitectureConfig, ConfigError, ConfigWarning, CurriculumConfig, EvaluationConfig,
    ExperimentConfig, MilestoneConfig,
};
pub use error::HarnessError;
pub use eval_sweep::{EvalPaths, EvalSweepRunner, read_eval_summary};
pub use legacy_conversion::{
    ArgKeyUpdate, CONVERSION_MANIFEST_FILE, CheckpointCopy, ConversionReport, LEGACY_KEY_RENAMES,
    LegacyConverter,
};
pub use log_parser::{LogParser, ParsedLog};
pub use manifest::{
    ArtifactManifest, EvalArtifacts, MANIFEST_FILE, MILESTONES_FILE, ParityArtifacts,
    ShortHorizonArtifacts,
};
pub use milestones::{
    GateInputs, LegacyRemovalGate, MilestoneGate, MilestoneReport, ParityResult,
    ShortHorizonResult, SingleStepResult,
};
pub use process::{InvocationOutcome, ProcessExecutor};
pub use run_dir::RunDirectoryAllocator;
pub use runner::ExperimentRunner;
