//! # gaitlab-proto
//!
//! Shared types and traits for the gaitlab migration harness.
//!
//! This crate provides the vocabulary used across all gaitlab crates,
//! including:
//! - Execution backends and architecture families understood by the simulator
//! - Training points and evaluation summaries parsed from simulator output
//! - The `ProcessRunner` capability through which the simulator is invoked

mod backend;
mod metrics;
mod runner;

pub use backend::{ArchitectureFamily, ParseNameError, PolicyBackend};
pub use metrics::{EvalSummary, SummaryError, TrainingPoint};
pub use runner::{ARG_FILE_FLAG, ExitReport, Invocation, ProcessRunner};
