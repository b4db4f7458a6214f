//! The artifact manifest: where every file of one run lives.
//!
//! All paths except `run_dir` are relative to `run_dir`, so a run directory
//! can be moved or archived without invalidating its manifest.

use crate::config::ExperimentConfig;
use crate::error::{HarnessError, write_json};
use crate::eval_sweep::EvalPaths;
use crate::milestones::{PARITY_DIR, SHORT_HORIZON_DIR, ShortHorizonPaths};
use crate::runner::checkpoint_file_name;
use gaitlab_proto::PolicyBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_SNAPSHOT_FILE: &str = "config_snapshot.json";
pub const TRAIN_ARGS_FILE: &str = "train_args.txt";
pub const TRAIN_LOG_FILE: &str = "train.log";
pub const REWARD_CURVE_FILE: &str = "reward_curve.csv";
pub const COMPARISON_FILE: &str = "comparison.json";
pub const MILESTONES_FILE: &str = "milestones.json";
pub const RUNTIME_EVAL_ARGS_FILE: &str = "runtime_eval_args.txt";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Files of one evaluation on one terrain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalArtifacts {
    pub terrain: String,
    pub args: PathBuf,
    pub log: PathBuf,
    pub result: PathBuf,
}

impl EvalArtifacts {
    fn sweep(dir: &Path, config: &ExperimentConfig) -> Vec<Self> {
        config
            .curriculum
            .terrain_types
            .iter()
            .map(|terrain| {
                let paths = EvalPaths::new(dir, terrain);
                EvalArtifacts {
                    terrain: terrain.clone(),
                    args: paths.args,
                    log: paths.log,
                    result: paths.result,
                }
            })
            .collect()
    }
}

/// Files of the parity sweep on one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParityArtifacts {
    pub backend: PolicyBackend,
    pub evaluations: Vec<EvalArtifacts>,
}

/// Files of the short-horizon training run.
///
/// The log is missing when the simulator could not be launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortHorizonArtifacts {
    pub args: PathBuf,
    pub log: PathBuf,
}

/// Record of every artifact a run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub run_dir: PathBuf,
    pub config_snapshot: PathBuf,
    pub train_args: PathBuf,
    pub train_log: PathBuf,
    pub checkpoint: PathBuf,
    pub reward_curve: PathBuf,
    pub evaluations: Vec<EvalArtifacts>,
    pub comparison: PathBuf,
    /// Per-backend parity sweeps; empty when the parity milestone is off.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parity: Vec<ParityArtifacts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_horizon: Option<ShortHorizonArtifacts>,
    pub milestones: PathBuf,
    pub runtime_eval_args: PathBuf,
    /// Aggregate verdict copied from the milestone report.
    pub can_remove_legacy_mode: bool,
}

impl ArtifactManifest {
    /// Lays out the artifacts of a run of `config` inside `run_dir`.
    ///
    /// The verdict starts out false and is filled in once the gate has run.
    pub fn plan(run_dir: impl Into<PathBuf>, config: &ExperimentConfig) -> Self {
        let milestones = &config.milestones;
        let parity = if milestones.enable_parity_check {
            PolicyBackend::ALL
                .iter()
                .map(|&backend| ParityArtifacts {
                    backend,
                    evaluations: EvalArtifacts::sweep(
                        &Path::new(PARITY_DIR).join(backend.as_str()),
                        config,
                    ),
                })
                .collect()
        } else {
            Vec::new()
        };
        let short_horizon = milestones.enable_short_horizon_sanity.then(|| {
            let paths = ShortHorizonPaths::new(Path::new(SHORT_HORIZON_DIR), config);
            ShortHorizonArtifacts {
                args: paths.args,
                log: paths.log,
            }
        });

        Self {
            run_dir: run_dir.into(),
            config_snapshot: PathBuf::from(CONFIG_SNAPSHOT_FILE),
            train_args: PathBuf::from(TRAIN_ARGS_FILE),
            train_log: PathBuf::from(TRAIN_LOG_FILE),
            checkpoint: PathBuf::from(checkpoint_file_name(config)),
            reward_curve: PathBuf::from(REWARD_CURVE_FILE),
            evaluations: EvalArtifacts::sweep(Path::new(""), config),
            comparison: PathBuf::from(COMPARISON_FILE),
            parity,
            short_horizon,
            milestones: PathBuf::from(MILESTONES_FILE),
            runtime_eval_args: PathBuf::from(RUNTIME_EVAL_ARGS_FILE),
            can_remove_legacy_mode: false,
        }
    }

    /// Resolves a manifest-relative path against the run directory.
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.run_dir.join(relative)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), HarnessError> {
        write_json(path, self)
    }

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
