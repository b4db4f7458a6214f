//! Full benchmark matrix: one harness run per architecture and terrain.

use crate::config::{ExperimentConfig, terrain_key};
use crate::error::{HarnessError, write_json};
use crate::runner::ExperimentRunner;
use gaitlab_proto::{ArchitectureFamily, ProcessRunner};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// One completed cell of the matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixEntry {
    pub architecture: ArchitectureFamily,
    pub terrain: String,
    pub run_dir: PathBuf,
    pub comparison: PathBuf,
    pub milestones: PathBuf,
}

/// Sweeps a base config over architecture families and curriculum terrains.
pub struct BenchmarkMatrix {
    base: ExperimentConfig,
    architectures: Vec<ArchitectureFamily>,
    runner: Arc<dyn ProcessRunner>,
}

impl BenchmarkMatrix {
    /// Creates a matrix over every architecture family.
    pub fn new(base: ExperimentConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            base,
            architectures: ArchitectureFamily::ALL.to_vec(),
            runner,
        }
    }

    pub fn with_architectures(mut self, architectures: Vec<ArchitectureFamily>) -> Self {
        self.architectures = architectures;
        self
    }

    /// Config for one cell: the base with family, terrain and name replaced
    /// and the full-matrix milestone switched on.
    pub fn variant(&self, family: ArchitectureFamily, terrain: &str) -> ExperimentConfig {
        let mut config = self.base.clone();
        config.architecture.family = family;
        config.terrain_file = terrain.to_string();
        config.name = format!("{}_{}_{}", self.base.name, terrain_key(terrain), family);
        config.milestones.enable_full_benchmark_matrix = true;
        config
    }

    /// Where the matrix summary is written.
    pub fn summary_path(&self) -> PathBuf {
        self.base
            .output_root
            .join(format!("{}_full_benchmark_matrix.json", self.base.name))
    }

    /// Runs every cell in order, architecture-major, and writes the summary.
    ///
    /// The first failing run aborts the matrix.
    pub async fn run(&self) -> Result<PathBuf, HarnessError> {
        let terrains = &self.base.curriculum.terrain_types;
        info!(
            architectures = self.architectures.len(),
            terrains = terrains.len(),
            "Starting benchmark matrix"
        );

        let mut entries = Vec::with_capacity(self.architectures.len() * terrains.len());
        for &family in &self.architectures {
            for terrain in terrains {
                let config = self.variant(family, terrain);
                info!(name = %config.name, "Running matrix cell");
                let manifest = ExperimentRunner::new(config, Arc::clone(&self.runner))
                    .run()
                    .await?;
                entries.push(MatrixEntry {
                    architecture: family,
                    terrain: terrain.clone(),
                    comparison: manifest.resolve(&manifest.comparison),
                    milestones: manifest.resolve(&manifest.milestones),
                    run_dir: manifest.run_dir,
                });
            }
        }

        let out = self.summary_path();
        write_json(&out, &entries)?;
        info!(summary = %out.display(), cells = entries.len(), "Benchmark matrix complete");
        Ok(out)
    }
}
