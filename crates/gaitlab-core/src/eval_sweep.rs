//! Evaluation sweeps over the curriculum terrains.
//!
//! For every terrain, in curriculum order, the sweep writes an argument set,
//! runs the simulator, and reads back the result file whose location it
//! passed as `poli_eval_output`. Any missing or malformed result fails the
//! whole sweep, as does a result that names a different terrain.

use crate::arg_file::ArgumentSet;
use crate::architecture::resolve_template;
use crate::config::{ExperimentConfig, terrain_key};
use crate::error::HarnessError;
use crate::process::ProcessExecutor;
use gaitlab_proto::{EvalSummary, PolicyBackend};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Files produced for one terrain of a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalPaths {
    pub args: PathBuf,
    pub log: PathBuf,
    pub result: PathBuf,
}

impl EvalPaths {
    pub fn new(out_dir: &Path, terrain: &str) -> Self {
        let key = terrain_key(terrain);
        Self {
            args: out_dir.join(format!("eval_{key}_args.txt")),
            log: out_dir.join(format!("eval_{key}.log")),
            result: out_dir.join(format!("eval_{key}.json")),
        }
    }
}

/// Builds the evaluation argument set for one terrain.
///
/// `output` is the result location; it is omitted for the runtime hand-off
/// file, which only describes how to evaluate the checkpoint.
pub(crate) fn evaluation_arguments(
    config: &ExperimentConfig,
    terrain: &str,
    checkpoint: &Path,
    backend: PolicyBackend,
    output: Option<&Path>,
) -> ArgumentSet {
    let template = resolve_template(&config.templates_dir, config.architecture.family);
    let mut args = ArgumentSet::new()
        .with("scenario", "poli_eval")
        .with("character_file", &config.character_file)
        .with("state_file", &config.state_file)
        .with("char_type", &config.character)
        .with("char_ctrl", &config.controller)
        .with("terrain_file", terrain)
        .with("policy_arch_config", template.to_string_lossy())
        .with("policy_model", checkpoint.to_string_lossy())
        .with("policy_backend", backend.as_str());
    if let Some(output) = output {
        args.set("poli_eval_rand_seed", config.seed.to_string());
        args.set("poli_eval_max_episodes", config.evaluation.max_episodes.to_string());
        args.set("poli_eval_success_dist", format!("{:?}", config.evaluation.success_dist));
        args.set("poli_eval_output", output.to_string_lossy());
    }
    args
}

/// Reads and validates an evaluation result file.
pub fn read_eval_summary(path: &Path) -> Result<EvalSummary, HarnessError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(HarnessError::MissingArtifact(path.to_path_buf()));
        }
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            return Err(HarnessError::malformed(path, "result file is not valid UTF-8"));
        }
        Err(e) => return Err(HarnessError::io(path, e)),
    };
    let summary: EvalSummary =
        serde_json::from_str(&text).map_err(|e| HarnessError::malformed(path, e))?;
    summary
        .validate()
        .map_err(|e| HarnessError::malformed(path, e))?;
    Ok(summary)
}

/// Runs evaluation sweeps against one checkpoint.
#[derive(Debug, Clone, Copy)]
pub struct EvalSweepRunner<'a> {
    config: &'a ExperimentConfig,
    executor: &'a ProcessExecutor,
}

impl<'a> EvalSweepRunner<'a> {
    pub fn new(config: &'a ExperimentConfig, executor: &'a ProcessExecutor) -> Self {
        Self { config, executor }
    }

    /// Evaluates `checkpoint` with `backend` on every curriculum terrain.
    ///
    /// Artifacts go to `out_dir`. Returns one summary per terrain, in
    /// curriculum order.
    pub async fn run(
        &self,
        checkpoint: &Path,
        backend: PolicyBackend,
        out_dir: &Path,
    ) -> Result<Vec<EvalSummary>, HarnessError> {
        let terrains = &self.config.curriculum.terrain_types;
        info!(
            backend = %backend,
            terrains = terrains.len(),
            out_dir = %out_dir.display(),
            "Starting evaluation sweep"
        );

        let mut summaries = Vec::with_capacity(terrains.len());
        for terrain in terrains {
            let paths = EvalPaths::new(out_dir, terrain);
            let args =
                evaluation_arguments(self.config, terrain, checkpoint, backend, Some(&paths.result));
            args.write_to(&paths.args)?;

            // A result left over from an earlier invocation must not stand in
            // for one the simulator failed to write.
            match std::fs::remove_file(&paths.result) {
                Ok(()) => debug!(result = %paths.result.display(), "Removed stale evaluation result"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(HarnessError::io(&paths.result, e)),
            }

            let stage = format!("evaluation on {terrain} ({backend})");
            self.executor.execute(&stage, &paths.args, &paths.log).await?;

            let summary = read_eval_summary(&paths.result)?;
            if summary.terrain != *terrain {
                return Err(HarnessError::malformed(
                    &paths.result,
                    format!("result is for terrain '{}', expected '{terrain}'", summary.terrain),
                ));
            }
            debug!(
                terrain = %terrain,
                backend = %backend,
                success_rate = summary.success_rate,
                avg_dist = summary.avg_dist,
                "Evaluation complete"
            );
            summaries.push(summary);
        }

        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EvalScript, FakeSimulator};
    use gaitlab_proto::ArchitectureFamily;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn config() -> ExperimentConfig {
        ExperimentConfig::new(
            "walk",
            "mace",
            9,
            "sim",
            ArchitectureFamily::TerrainAttention,
            vec!["data/terrain/flat.txt".to_string()],
        )
    }

    #[test]
    fn test_eval_paths_use_terrain_stem() {
        let paths = EvalPaths::new(Path::new("runs/r1"), "data/terrain/gaps_wide.txt");
        assert_eq!(paths.args, PathBuf::from("runs/r1/eval_gaps_wide_args.txt"));
        assert_eq!(paths.log, PathBuf::from("runs/r1/eval_gaps_wide.log"));
        assert_eq!(paths.result, PathBuf::from("runs/r1/eval_gaps_wide.json"));
    }

    #[test]
    fn test_evaluation_arguments_wire_keys() {
        let args = evaluation_arguments(
            &config(),
            "data/terrain/flat.txt",
            Path::new("runs/r1/policy.h5"),
            PolicyBackend::Modern,
            Some(Path::new("runs/r1/eval_flat.json")),
        );
        let keys: Vec<&str> = args.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                "scenario",
                "character_file",
                "state_file",
                "char_type",
                "char_ctrl",
                "terrain_file",
                "policy_arch_config",
                "policy_model",
                "policy_backend",
                "poli_eval_rand_seed",
                "poli_eval_max_episodes",
                "poli_eval_success_dist",
                "poli_eval_output",
            ]
        );
        assert_eq!(args.get("policy_backend"), Some("modern_backend"));
        assert_eq!(
            args.get("policy_arch_config"),
            Some("experiments/templates/policy_terrain_attention.prototxt")
        );
        assert_eq!(args.get("poli_eval_max_episodes"), Some("20"));
        assert_eq!(args.get("poli_eval_success_dist"), Some("1.0"));
    }

    #[test]
    fn test_handoff_arguments_omit_output() {
        let args = evaluation_arguments(
            &config(),
            "data/terrain/mixed.txt",
            Path::new("policy.h5"),
            PolicyBackend::LegacyCaffe,
            None,
        );
        assert!(args.get("poli_eval_output").is_none());
        assert_eq!(args.get("policy_backend"), Some("legacy_caffe"));
    }

    fn executor(sim: &FakeSimulator) -> ProcessExecutor {
        ProcessExecutor::new(Arc::new(sim.clone()), "sim")
    }

    #[tokio::test]
    async fn test_sweep_does_not_reuse_existing_result() {
        let dir = TempDir::new().unwrap();
        let config = config();
        let stale = EvalPaths::new(dir.path(), "data/terrain/flat.txt").result;
        std::fs::write(
            &stale,
            r#"{"terrain":"data/terrain/flat.txt","episodes":20,"avg_dist":2.0,"success_rate":0.8}"#,
        )
        .unwrap();
        let sim = FakeSimulator::new().with_default_eval(EvalScript::Missing);

        let err = EvalSweepRunner::new(&config, &executor(&sim))
            .run(Path::new("policy.h5"), PolicyBackend::LegacyCaffe, dir.path())
            .await
            .unwrap_err();

        assert!(matches!(&err, HarnessError::MissingArtifact(path) if *path == stale));
        assert_eq!(sim.invocation_count(), 1);
    }

    #[tokio::test]
    async fn test_sweep_rejects_result_for_other_terrain() {
        let dir = TempDir::new().unwrap();
        let config = config();
        let sim = FakeSimulator::new().with_default_eval(EvalScript::Malformed(
            r#"{"terrain":"data/terrain/hills.txt","episodes":20,"avg_dist":2.0,"success_rate":0.8}"#
                .to_string(),
        ));

        let err = EvalSweepRunner::new(&config, &executor(&sim))
            .run(Path::new("policy.h5"), PolicyBackend::Modern, dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::MalformedArtifact { .. }));
        assert!(err.to_string().contains("expected 'data/terrain/flat.txt'"));
    }

    #[tokio::test]
    async fn test_sweep_returns_summaries_in_curriculum_order() {
        let dir = TempDir::new().unwrap();
        let mut config = config();
        config.curriculum.terrain_types.push("data/terrain/hills.txt".to_string());
        let sim = FakeSimulator::new().with_eval(
            PolicyBackend::Modern,
            "data/terrain/hills.txt",
            EvalScript::result(0.5, 1.25),
        );

        let summaries = EvalSweepRunner::new(&config, &executor(&sim))
            .run(Path::new("policy.h5"), PolicyBackend::Modern, dir.path())
            .await
            .unwrap();

        let terrains: Vec<&str> = summaries.iter().map(|s| s.terrain.as_str()).collect();
        assert_eq!(terrains, vec!["data/terrain/flat.txt", "data/terrain/hills.txt"]);
        assert_eq!(summaries[1].avg_dist, 1.25);
    }

    #[test]
    fn test_read_missing_summary() {
        let dir = TempDir::new().unwrap();
        let err = read_eval_summary(&dir.path().join("eval_flat.json")).unwrap_err();
        assert!(matches!(err, HarnessError::MissingArtifact(_)));
    }

    #[test]
    fn test_read_malformed_summary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eval_flat.json");

        std::fs::write(&path, "{\"terrain\": \"flat\", \"episodes\": 20}").unwrap();
        assert!(matches!(
            read_eval_summary(&path),
            Err(HarnessError::MalformedArtifact { .. })
        ));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            read_eval_summary(&path),
            Err(HarnessError::MalformedArtifact { .. })
        ));

        std::fs::write(
            &path,
            r#"{"terrain":"flat","episodes":20,"avg_dist":1.0,"success_rate":1.7}"#,
        )
        .unwrap();
        let err = read_eval_summary(&path).unwrap_err();
        assert!(err.to_string().contains("success_rate"));
    }

    #[test]
    fn test_read_valid_summary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eval_flat.json");
        std::fs::write(
            &path,
            r#"{"terrain":"flat","episodes":20,"avg_dist":3.25,"success_rate":0.9}"#,
        )
        .unwrap();
        let summary = read_eval_summary(&path).unwrap();
        assert_eq!(summary.episodes, 20);
        assert_eq!(summary.avg_dist, 3.25);
    }
}
