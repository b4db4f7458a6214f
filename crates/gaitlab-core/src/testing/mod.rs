//! Testing utilities for deterministic pipeline tests.

pub mod fake_simulator;

pub use fake_simulator::{EvalScript, FakeSimulator, InvocationRecord, TrainingScript};
