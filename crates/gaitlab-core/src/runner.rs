//! End-to-end harness run: train, parse, evaluate, gate, record.

use crate::arg_file::ArgumentSet;
use crate::architecture::{ensure_templates_exist, resolve_template};
use crate::comparison::{ComparisonReport, write_reward_curve};
use crate::config::ExperimentConfig;
use crate::error::HarnessError;
use crate::eval_sweep::{EvalSweepRunner, evaluation_arguments};
use crate::log_parser::LogParser;
use crate::manifest::{ArtifactManifest, MANIFEST_FILE};
use crate::milestones::{GateInputs, MilestoneGate};
use crate::process::ProcessExecutor;
use crate::run_dir::RunDirectoryAllocator;
use chrono::Utc;
use gaitlab_proto::ProcessRunner;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Checkpoint file the simulator writes for a training run of `config`.
pub(crate) fn checkpoint_file_name(config: &ExperimentConfig) -> String {
    format!(
        "{}_{}_{}_seed{}.h5",
        config.name, config.algorithm, config.architecture.family, config.seed
    )
}

/// Builds the training argument set with an explicit iteration budget.
pub(crate) fn training_arguments(
    config: &ExperimentConfig,
    checkpoint: &Path,
    max_iter: u64,
) -> ArgumentSet {
    let template = resolve_template(&config.templates_dir, config.architecture.family);
    ArgumentSet::new()
        .with("scenario", format!("train_{}", config.algorithm))
        .with("output_path", checkpoint.to_string_lossy())
        .with("character_file", &config.character_file)
        .with("state_file", &config.state_file)
        .with("char_type", &config.character)
        .with("char_ctrl", &config.controller)
        .with("terrain_file", &config.terrain_file)
        .with("policy_arch_config", template.to_string_lossy())
        .with("policy_checkpoint", &config.policy_checkpoint_solver)
        .with("policy_backend", config.policy_backend.as_str())
        .with("trainer_max_iter", max_iter.to_string())
        .with("trainer_curriculum_iters", config.curriculum.total_iters.to_string())
        .with(
            "trainer_curriculum_stage_iters",
            config.curriculum.stage_iters.to_string(),
        )
        .with("rand_seed", config.seed.to_string())
}

/// Runs one experiment through the full pipeline.
///
/// Process execution goes through the injected [`ProcessRunner`], so tests
/// can substitute a scripted simulator for the real binary.
pub struct ExperimentRunner {
    config: ExperimentConfig,
    executor: ProcessExecutor,
}

impl std::fmt::Debug for ExperimentRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentRunner")
            .field("name", &self.config.name)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl ExperimentRunner {
    pub fn new(config: ExperimentConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        let executor = ProcessExecutor::new(runner, config.binary_path.clone())
            .with_timeout(config.process_timeout());
        Self { config, executor }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Executes the pipeline and returns the manifest of what was written.
    ///
    /// The configuration is validated first. Any fatal error aborts the run.
    /// Files written up to that point stay in the run directory.
    pub async fn run(&self) -> Result<ArtifactManifest, HarnessError> {
        let config = &self.config;
        for warning in config.validate()? {
            warn!("{warning}");
        }
        ensure_templates_exist(&config.templates_dir)?;

        let run_dir = RunDirectoryAllocator::new(&config.output_root).allocate(config, Utc::now())?;
        let mut manifest = ArtifactManifest::plan(&run_dir, config);
        config.snapshot(manifest.resolve(&manifest.config_snapshot))?;

        let checkpoint = manifest.resolve(&manifest.checkpoint);
        let train_args = manifest.resolve(&manifest.train_args);
        let train_log = manifest.resolve(&manifest.train_log);

        info!(
            name = %config.name,
            algorithm = %config.algorithm,
            seed = config.seed,
            backend = %config.policy_backend,
            max_iters = config.max_iters,
            "Starting training"
        );
        training_arguments(config, &checkpoint, config.max_iters).write_to(&train_args)?;
        let started = Instant::now();
        self.executor.execute("training", &train_args, &train_log).await?;
        let wall_clock_seconds = started.elapsed().as_secs_f64();

        let parsed = LogParser::new().parse_file(&train_log)?;
        info!(
            points = parsed.points.len(),
            wall_clock_seconds, "Training finished"
        );
        write_reward_curve(&parsed.points, &manifest.resolve(&manifest.reward_curve))?;

        let summaries = EvalSweepRunner::new(config, &self.executor)
            .run(&checkpoint, config.policy_backend, &run_dir)
            .await?;

        let comparison = ComparisonReport::build(&parsed.points, &summaries, wall_clock_seconds);
        comparison.write_to(&manifest.resolve(&manifest.comparison))?;
        info!(
            reward_mean = comparison.reward_mean,
            reward_final = comparison.reward_final,
            success_rate_mean = comparison.success_rate_mean,
            "Comparison report written"
        );

        let report = MilestoneGate::new(config, &self.executor)
            .evaluate(GateInputs {
                run_dir: &run_dir,
                checkpoint: &checkpoint,
                train_log: &train_log,
                eval_summaries: summaries.len(),
            })
            .await?;
        report.write_to(&manifest.resolve(&manifest.milestones))?;
        manifest.can_remove_legacy_mode = report.legacy_removal_gate.can_remove_legacy_mode;

        evaluation_arguments(
            config,
            &config.terrain_file,
            &checkpoint,
            config.policy_backend,
            None,
        )
        .write_to(&manifest.resolve(&manifest.runtime_eval_args))?;

        manifest.write_to(&run_dir.join(MANIFEST_FILE))?;
        info!(run_dir = %run_dir.display(), "Run complete");
        Ok(manifest)
    }
}
