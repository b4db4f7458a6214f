//! # gaitlab-adapters
//!
//! Process adapters for the gaitlab harness.
//!
//! This crate provides the production implementation of
//! `gaitlab_proto::ProcessRunner`: `SimulatorExecutor` spawns the external
//! simulator binary with its argument file and captures combined output to
//! the invocation's log file.

mod simulator_executor;

pub use simulator_executor::SimulatorExecutor;
