//! # gaitlab-cli
//!
//! Binary entry point for the gaitlab migration harness.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Config loading, overrides and validation
//! - `gaitlab run`: one training/evaluation run plus the milestone gate
//! - `gaitlab matrix`: the full architecture × terrain benchmark matrix
//! - `gaitlab gate`: replaying the legacy-removal verdict of a finished run
//! - `gaitlab convert-legacy`: one-time conversion of legacy policy assets

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gaitlab_adapters::SimulatorExecutor;
use gaitlab_core::{
    BenchmarkMatrix, CONVERSION_MANIFEST_FILE, ExperimentConfig, ExperimentRunner,
    LegacyConverter, LegacyRemovalGate, MILESTONES_FILE, MilestoneReport,
};
use gaitlab_proto::{ArchitectureFamily, PolicyBackend};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// gaitlab - terrain locomotion training harness and backend migration gate
#[derive(Parser, Debug)]
#[command(name = "gaitlab", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train, evaluate and gate one experiment
    Run(RunArgs),

    /// Run the experiment for every architecture and curriculum terrain
    Matrix(MatrixArgs),

    /// Replay the legacy-removal verdict of a finished run
    Gate(GateArgs),

    /// Rename legacy argument keys and add .pt copies of .h5 checkpoints
    ConvertLegacy(ConvertLegacyArgs),
}

/// Settings shared by `run` and `matrix`.
#[derive(Parser, Debug)]
struct ConfigArgs {
    /// Experiment config (YAML or JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the directory run directories are created in
    #[arg(long)]
    output_root: Option<PathBuf>,

    /// Override the backend used for training and the primary evaluation
    #[arg(long)]
    backend: Option<PolicyBackend>,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Parser, Debug)]
struct MatrixArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Architecture families to sweep (default: all)
    #[arg(long, num_args = 1..)]
    architectures: Vec<ArchitectureFamily>,
}

#[derive(Parser, Debug)]
struct GateArgs {
    /// Run directory, or a milestones.json file
    path: PathBuf,

    /// Print the verdict as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct ConvertLegacyArgs {
    /// Repository root containing args/ and data/policies/
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Apply the conversion instead of only writing the manifest
    #[arg(long)]
    apply: bool,

    /// Manifest location, relative to the root unless absolute
    #[arg(long, default_value = CONVERSION_MANIFEST_FILE)]
    manifest: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => run_command(args).await,
        Commands::Matrix(args) => matrix_command(args).await,
        Commands::Gate(args) => gate_command(&args),
        Commands::ConvertLegacy(args) => convert_legacy_command(&args),
    }
}

fn load_config(args: &ConfigArgs) -> Result<ExperimentConfig> {
    let mut config = ExperimentConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(root) = &args.output_root {
        config.output_root = root.clone();
    }
    if let Some(backend) = args.backend {
        config.policy_backend = backend;
    }

    let warnings = config.validate().context("Configuration validation failed")?;
    for warning in &warnings {
        eprintln!("{warning}");
    }
    Ok(config)
}

async fn run_command(args: RunArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    info!(config = %args.config.config.display(), "Loaded experiment config");

    let manifest = ExperimentRunner::new(config, Arc::new(SimulatorExecutor::new()))
        .run()
        .await
        .context("Experiment run failed")?;

    if !manifest.can_remove_legacy_mode {
        warn!("Legacy removal is blocked; see {}", manifest.resolve(&manifest.milestones).display());
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&manifest).context("Failed to render manifest")?
    );
    Ok(())
}

async fn matrix_command(args: MatrixArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let mut matrix = BenchmarkMatrix::new(config, Arc::new(SimulatorExecutor::new()));
    if !args.architectures.is_empty() {
        matrix = matrix.with_architectures(args.architectures);
    }

    let summary = matrix.run().await.context("Benchmark matrix failed")?;
    println!("{}", summary.display());
    Ok(())
}

fn milestones_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(MILESTONES_FILE)
    } else {
        path.to_path_buf()
    }
}

fn gate_command(args: &GateArgs) -> Result<()> {
    let path = milestones_path(&args.path);
    let report = MilestoneReport::from_file(&path)
        .with_context(|| format!("Failed to read milestone report {:?}", path))?;

    // The entries are authoritative; the stored verdict is only checked.
    let gate = LegacyRemovalGate::evaluate(&report);
    if !report.gate_is_consistent() {
        warn!(
            "Stored legacy_removal_gate in {:?} disagrees with its milestones; using the recomputed verdict",
            path
        );
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&gate).context("Failed to render verdict")?
        );
    } else {
        for (name, passed) in report.entries() {
            println!("{} {name}", if passed { "PASS" } else { "FAIL" });
        }
        if report.entries().is_empty() {
            println!("No milestones were enabled for this run");
        }
        println!("can_remove_legacy_mode: {}", gate.can_remove_legacy_mode);
        println!("requires_docs_update: {}", gate.requires_docs_update);
    }

    if !gate.can_remove_legacy_mode {
        anyhow::bail!("Legacy removal blocked by: {}", gate.blocking.join(", "));
    }
    Ok(())
}

fn convert_legacy_command(args: &ConvertLegacyArgs) -> Result<()> {
    let converter = LegacyConverter::new(&args.root);
    let report = converter
        .run(args.apply)
        .with_context(|| format!("Legacy conversion failed under {:?}", args.root))?;

    let manifest = args.root.join(&args.manifest);
    report
        .write_to(&manifest)
        .with_context(|| format!("Failed to write conversion manifest {:?}", manifest))?;

    let mode = if args.apply { "APPLY" } else { "DRY-RUN" };
    println!("[{mode}] Wrote manifest: {}", manifest.display());
    println!("Arg files to update: {}", report.arg_updates.len());
    println!("Model checkpoints to copy: {}", report.model_updates.len());
    Ok(())
}
