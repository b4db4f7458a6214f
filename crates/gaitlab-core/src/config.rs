//! Configuration types for gaitlab experiments.
//!
//! An `ExperimentConfig` is the full identity of one harness invocation:
//! who is trained (character, controller, architecture), on what
//! (curriculum terrains), with which backend, and which migration
//! milestones are checked afterwards. It is read-only once loaded.

use gaitlab_proto::{ArchitectureFamily, PolicyBackend};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Top-level experiment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Experiment name, the first component of every run directory name.
    pub name: String,

    /// Learning algorithm; selects the `train_{algorithm}` scenario.
    pub algorithm: String,

    /// Random seed forwarded to training and evaluation.
    pub seed: u64,

    /// Path to the simulator binary.
    pub binary_path: PathBuf,

    /// Character type (`char_type`).
    pub character: String,

    /// Controller type (`char_ctrl`).
    pub controller: String,

    pub state_file: String,

    pub character_file: String,

    pub architecture: ArchitectureConfig,

    pub curriculum: CurriculumConfig,

    /// Solver definition used to initialise policy checkpoints.
    pub policy_checkpoint_solver: String,

    /// Backend used for the primary training run and evaluation sweep.
    #[serde(default)]
    pub policy_backend: PolicyBackend,

    /// Whether the legacy backend may still be selected as `policy_backend`.
    #[serde(default = "default_true")]
    pub legacy_mode_enabled: bool,

    #[serde(default = "default_max_iters")]
    pub max_iters: u64,

    /// Directory under which run directories are created.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Terrain used for training and the runtime evaluation hand-off.
    #[serde(default = "default_terrain_file")]
    pub terrain_file: String,

    /// Directory holding the `policy_{family}.prototxt` templates.
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,

    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// Per-invocation limit for simulator processes. Unset waits forever.
    #[serde(default)]
    pub process_timeout_secs: Option<u64>,

    #[serde(default)]
    pub milestones: MilestoneConfig,
}

fn default_true() -> bool {
    true
}

fn default_max_iters() -> u64 {
    2000
}

fn default_output_root() -> PathBuf {
    PathBuf::from("experiments/results")
}

fn default_terrain_file() -> String {
    "data/terrain/mixed.txt".to_string()
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("experiments/templates")
}

/// Policy network architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    pub family: ArchitectureFamily,

    #[serde(default = "default_hidden_sizes")]
    pub hidden_sizes: Vec<u32>,

    #[serde(default = "default_conv_channels")]
    pub conv_channels: Vec<u32>,

    #[serde(default)]
    pub use_attention: bool,

    #[serde(default = "default_attention_heads")]
    pub attention_heads: u32,

    #[serde(default = "default_attention_dim")]
    pub attention_dim: u32,
}

fn default_hidden_sizes() -> Vec<u32> {
    vec![512, 256]
}

fn default_conv_channels() -> Vec<u32> {
    vec![32, 32]
}

fn default_attention_heads() -> u32 {
    4
}

fn default_attention_dim() -> u32 {
    128
}

impl ArchitectureConfig {
    pub fn new(family: ArchitectureFamily) -> Self {
        Self {
            family,
            hidden_sizes: default_hidden_sizes(),
            conv_channels: default_conv_channels(),
            use_attention: false,
            attention_heads: default_attention_heads(),
            attention_dim: default_attention_dim(),
        }
    }
}

/// Ordered terrains plus iteration staging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurriculumConfig {
    /// Terrain files, in evaluation order.
    pub terrain_types: Vec<String>,

    #[serde(default)]
    pub stage_iters: u64,

    #[serde(default)]
    pub total_iters: u64,
}

/// Evaluation sweep parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_max_episodes")]
    pub max_episodes: u32,

    /// Distance an episode must cover to count as a success.
    #[serde(default = "default_success_dist")]
    pub success_dist: f64,
}

fn default_max_episodes() -> u32 {
    20
}

fn default_success_dist() -> f64 {
    1.0
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            max_episodes: default_max_episodes(),
            success_dist: default_success_dist(),
        }
    }
}

/// Toggles and thresholds for the legacy-removal milestones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneConfig {
    #[serde(default = "default_true")]
    pub enable_parity_check: bool,

    /// Largest accepted per-terrain delta for both parity metrics.
    #[serde(default = "default_parity_tolerance")]
    pub parity_tolerance: f64,

    #[serde(default = "default_true")]
    pub enable_single_step_sanity: bool,

    #[serde(default = "default_min_nonzero_gradients")]
    pub min_nonzero_gradients: usize,

    #[serde(default = "default_true")]
    pub enable_short_horizon_sanity: bool,

    #[serde(default = "default_short_horizon_iters")]
    pub short_horizon_iters: u64,

    #[serde(default)]
    pub enable_full_benchmark_matrix: bool,
}

fn default_parity_tolerance() -> f64 {
    0.05
}

fn default_min_nonzero_gradients() -> usize {
    1
}

fn default_short_horizon_iters() -> u64 {
    100
}

impl Default for MilestoneConfig {
    fn default() -> Self {
        Self {
            enable_parity_check: true,
            parity_tolerance: default_parity_tolerance(),
            enable_single_step_sanity: true,
            min_nonzero_gradients: default_min_nonzero_gradients(),
            enable_short_horizon_sanity: true,
            short_horizon_iters: default_short_horizon_iters(),
            enable_full_benchmark_matrix: false,
        }
    }
}

impl MilestoneConfig {
    /// Returns true when no milestone stage would run.
    pub fn all_disabled(&self) -> bool {
        !(self.enable_parity_check
            || self.enable_single_step_sanity
            || self.enable_short_horizon_sanity
            || self.enable_full_benchmark_matrix)
    }
}

impl ExperimentConfig {
    /// Creates a config with defaults for everything but identity and paths.
    pub fn new(
        name: impl Into<String>,
        algorithm: impl Into<String>,
        seed: u64,
        binary_path: impl Into<PathBuf>,
        family: ArchitectureFamily,
        terrains: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            algorithm: algorithm.into(),
            seed,
            binary_path: binary_path.into(),
            character: "dog".to_string(),
            controller: "dog_mace".to_string(),
            state_file: "data/states/dog_bind_pose.txt".to_string(),
            character_file: "data/characters/dog.txt".to_string(),
            architecture: ArchitectureConfig::new(family),
            curriculum: CurriculumConfig {
                terrain_types: terrains,
                stage_iters: 0,
                total_iters: 0,
            },
            policy_checkpoint_solver: "data/policies/dog/nets/dog_solver.prototxt".to_string(),
            policy_backend: PolicyBackend::default(),
            legacy_mode_enabled: true,
            max_iters: default_max_iters(),
            output_root: default_output_root(),
            terrain_file: default_terrain_file(),
            templates_dir: default_templates_dir(),
            evaluation: EvaluationConfig::default(),
            process_timeout_secs: None,
            milestones: MilestoneConfig::default(),
        }
    }

    /// Loads configuration from a YAML or JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        debug!(path = %path_ref.display(), "Loading experiment config");
        let content = std::fs::read_to_string(path_ref)?;
        Self::parse(&content)
    }

    /// Parses configuration from YAML (JSON is accepted as a YAML subset).
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Validates the configuration and returns non-fatal warnings.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        for (field, value) in [
            ("name", self.name.as_str()),
            ("algorithm", self.algorithm.as_str()),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("'{field}' must not be empty")));
            }
        }
        if self.binary_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "'binary_path' must not be empty".to_string(),
            ));
        }
        if self.max_iters == 0 {
            return Err(ConfigError::Invalid("'max_iters' must be positive".to_string()));
        }
        if self.evaluation.max_episodes == 0 {
            return Err(ConfigError::Invalid(
                "'evaluation.max_episodes' must be positive".to_string(),
            ));
        }

        if self.curriculum.terrain_types.is_empty() {
            return Err(ConfigError::Invalid(
                "'curriculum.terrain_types' must list at least one terrain".to_string(),
            ));
        }
        let mut keys = HashSet::new();
        for terrain in &self.curriculum.terrain_types {
            let key = terrain_key(terrain);
            if !keys.insert(key.clone()) {
                return Err(ConfigError::DuplicateTerrain {
                    terrain: terrain.clone(),
                    key,
                });
            }
        }

        let tolerance = self.milestones.parity_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "'milestones.parity_tolerance' must be a finite non-negative number, got {tolerance}"
            )));
        }
        if self.milestones.enable_short_horizon_sanity && self.milestones.short_horizon_iters == 0 {
            return Err(ConfigError::Invalid(
                "'milestones.short_horizon_iters' must be positive".to_string(),
            ));
        }

        if self.policy_backend.is_legacy() && !self.legacy_mode_enabled {
            return Err(ConfigError::LegacyModeDisabled);
        }

        let mut warnings = Vec::new();
        if self.milestones.all_disabled() {
            warnings.push(ConfigWarning::AllMilestonesDisabled);
        }
        if self.milestones.enable_short_horizon_sanity
            && self.milestones.short_horizon_iters >= self.max_iters
        {
            warnings.push(ConfigWarning::ShortHorizonNotShorter {
                short_horizon_iters: self.milestones.short_horizon_iters,
                max_iters: self.max_iters,
            });
        }
        Ok(warnings)
    }

    /// Returns the process timeout, if one is configured.
    pub fn process_timeout(&self) -> Option<Duration> {
        self.process_timeout_secs.map(Duration::from_secs)
    }

    /// Writes the full configuration as pretty JSON.
    pub fn snapshot(&self, dst: impl AsRef<Path>) -> Result<(), ConfigError> {
        let dst = dst.as_ref();
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(dst, json)?;
        Ok(())
    }
}

/// Stable per-terrain key used in artifact filenames: the file stem.
pub(crate) fn terrain_key(terrain: &str) -> String {
    Path::new(terrain)
        .file_stem()
        .map_or_else(|| terrain.to_string(), |stem| stem.to_string_lossy().into_owned())
}

/// Configuration warnings emitted during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// No milestone is enabled, so the legacy-removal gate passes vacuously.
    AllMilestonesDisabled,
    /// The short-horizon run is not actually shorter than full training.
    ShortHorizonNotShorter {
        short_horizon_iters: u64,
        max_iters: u64,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::AllMilestonesDisabled => write!(
                f,
                "Warning: every milestone is disabled; the legacy removal gate will pass without evidence"
            ),
            ConfigWarning::ShortHorizonNotShorter {
                short_horizon_iters,
                max_iters,
            } => write!(
                f,
                "Warning: short_horizon_iters ({short_horizon_iters}) is not below max_iters ({max_iters})"
            ),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Terrain '{terrain}' reuses the artifact key '{key}' of an earlier terrain")]
    DuplicateTerrain { terrain: String, key: String },

    #[error("policy_backend is legacy_caffe but legacy_mode_enabled is false")]
    LegacyModeDisabled,
}
