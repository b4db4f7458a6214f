//! Scripted stand-in for the simulator binary.
//!
//! `FakeSimulator` implements `ProcessRunner` by reading the argument file it
//! is handed and acting on its `scenario`:
//! - `train_*`: writes the next scripted training log and, on a zero exit,
//!   an empty checkpoint at `output_path`. A training script can instead
//!   fail to launch, in which case no log is written.
//! - `poli_eval`: writes the scripted evaluation result for the
//!   `(policy_backend, terrain_file)` pair to `poli_eval_output`.
//!
//! Every invocation is recorded so tests can assert on what the harness ran.
//!
//! # Example
//!
//! ```
//! use gaitlab_core::testing::{EvalScript, FakeSimulator};
//! use gaitlab_proto::PolicyBackend;
//!
//! let sim = FakeSimulator::new()
//!     .with_training("Iter 0\nAvg Tuple Reward: 1.0\n", 0)
//!     .with_eval(PolicyBackend::Modern, "flat.txt", EvalScript::result(0.5, 1.5));
//! assert_eq!(sim.invocation_count(), 0);
//! ```

use crate::arg_file::ArgumentSet;
use async_trait::async_trait;
use gaitlab_proto::{ExitReport, Invocation, PolicyBackend, ProcessRunner};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A log that satisfies every log-based milestone: rewards under `Iter`
/// context, a decreasing loss and non-zero gradients.
pub const HEALTHY_TRAINING_LOG: &str = "\
Iter 0
Avg Tuple Reward: 0.12
Critic loss: 2.5
Actor grad_norm: 0.81
Iter 1
Avg Tuple Reward: 0.34
Critic loss: 1.75
Actor grad_norm: 0.64
Iter 2
Avg Tuple Reward: 0.51
Critic loss: 1.2
Actor grad_norm: 0.42
";

/// Behaviour of one training invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingScript {
    pub log: String,
    pub exit_code: i32,
    /// Fail as if the binary could not be started.
    pub launch_failure: bool,
}

impl TrainingScript {
    fn exited(log: impl Into<String>, exit_code: i32) -> Self {
        Self {
            log: log.into(),
            exit_code,
            launch_failure: false,
        }
    }
}

/// Behaviour of one evaluation invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalScript {
    /// Exit zero and write a well-formed result.
    Result { success_rate: f64, avg_dist: f64 },
    /// Exit zero without writing a result file.
    Missing,
    /// Exit zero and write the given text as the result file.
    Malformed(String),
    /// Exit with the given non-zero code.
    Exit(i32),
}

impl EvalScript {
    pub fn result(success_rate: f64, avg_dist: f64) -> Self {
        EvalScript::Result {
            success_rate,
            avg_dist,
        }
    }
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct InvocationRecord {
    pub invocation: Invocation,
    pub args: ArgumentSet,
}

impl InvocationRecord {
    pub fn scenario(&self) -> &str {
        self.args.get("scenario").unwrap_or_default()
    }
}

#[derive(Debug)]
struct State {
    training: VecDeque<TrainingScript>,
    default_training: TrainingScript,
    eval: HashMap<(PolicyBackend, String), EvalScript>,
    default_eval: EvalScript,
    invocations: Vec<InvocationRecord>,
}

/// Scripted simulator. Clones share scripts and the invocation record.
#[derive(Debug, Clone)]
pub struct FakeSimulator {
    state: Arc<Mutex<State>>,
}

impl Default for FakeSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSimulator {
    /// Trains with [`HEALTHY_TRAINING_LOG`] and evaluates every terrain to
    /// `success_rate = 0.8, avg_dist = 2.0` on both backends.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                training: VecDeque::new(),
                default_training: TrainingScript::exited(HEALTHY_TRAINING_LOG, 0),
                eval: HashMap::new(),
                default_eval: EvalScript::result(0.8, 2.0),
                invocations: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues the response for the next unscripted training invocation.
    pub fn with_training(self, log: impl Into<String>, exit_code: i32) -> Self {
        self.lock()
            .training
            .push_back(TrainingScript::exited(log, exit_code));
        self
    }

    /// Queues a training invocation that fails to launch.
    pub fn with_training_launch_failure(self) -> Self {
        self.lock().training.push_back(TrainingScript {
            log: String::new(),
            exit_code: 0,
            launch_failure: true,
        });
        self
    }

    /// Response used once the training queue is empty.
    pub fn with_default_training(self, log: impl Into<String>, exit_code: i32) -> Self {
        self.lock().default_training = TrainingScript::exited(log, exit_code);
        self
    }

    /// Scripts evaluation of `terrain` (as written in `terrain_file`).
    pub fn with_eval(self, backend: PolicyBackend, terrain: impl Into<String>, script: EvalScript) -> Self {
        self.lock().eval.insert((backend, terrain.into()), script);
        self
    }

    pub fn with_default_eval(self, script: EvalScript) -> Self {
        self.lock().default_eval = script;
        self
    }

    pub fn invocations(&self) -> Vec<InvocationRecord> {
        self.lock().invocations.clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.lock().invocations.len()
    }

    /// Scenario of every invocation, in order.
    pub fn scenarios(&self) -> Vec<String> {
        self.lock()
            .invocations
            .iter()
            .map(|r| r.scenario().to_string())
            .collect()
    }

    fn train(&self, args: &ArgumentSet, log_file: &Path) -> io::Result<ExitReport> {
        let script = {
            let mut state = self.lock();
            state
                .training
                .pop_front()
                .unwrap_or_else(|| state.default_training.clone())
        };
        if script.launch_failure {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "scripted launch failure",
            ));
        }
        write_file(log_file, &script.log)?;
        if script.exit_code == 0 {
            if let Some(output) = args.get("output_path") {
                write_file(Path::new(output), "")?;
            }
        }
        Ok(ExitReport::exited(script.exit_code))
    }

    fn evaluate(&self, args: &ArgumentSet, log_file: &Path) -> io::Result<ExitReport> {
        let terrain = args.get("terrain_file").unwrap_or_default().to_string();
        let backend = args
            .get("policy_backend")
            .and_then(|b| b.parse::<PolicyBackend>().ok())
            .unwrap_or_default();
        let script = {
            let state = self.lock();
            state
                .eval
                .get(&(backend, terrain.clone()))
                .unwrap_or(&state.default_eval)
                .clone()
        };

        write_file(log_file, &format!("Evaluating {terrain} with {backend}\n"))?;
        let output = args.get("poli_eval_output").map(Path::new);
        match (script, output) {
            (EvalScript::Exit(code), _) => return Ok(ExitReport::exited(code)),
            (EvalScript::Result { success_rate, avg_dist }, Some(output)) => {
                let body = serde_json::json!({
                    "terrain": terrain,
                    "episodes": 20,
                    "avg_dist": avg_dist,
                    "success_rate": success_rate,
                });
                write_file(output, &body.to_string())?;
            }
            (EvalScript::Malformed(text), Some(output)) => write_file(output, &text)?,
            (EvalScript::Missing, _) | (_, None) => {}
        }
        Ok(ExitReport::exited(0))
    }
}

fn write_file(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)
}

#[async_trait]
impl ProcessRunner for FakeSimulator {
    async fn run(&self, invocation: &Invocation) -> io::Result<ExitReport> {
        let args = ArgumentSet::read_from(&invocation.arg_file)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        self.lock().invocations.push(InvocationRecord {
            invocation: invocation.clone(),
            args: args.clone(),
        });

        match args.get("scenario") {
            Some(s) if s.starts_with("train_") => self.train(&args, &invocation.log_file),
            Some("poli_eval") => self.evaluate(&args, &invocation.log_file),
            other => {
                write_file(&invocation.log_file, &format!("Unknown scenario: {other:?}\n"))?;
                Ok(ExitReport::exited(2))
            }
        }
    }
}
