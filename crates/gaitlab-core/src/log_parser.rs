//! Metric extraction from simulator training logs.
//!
//! Three independent series are read from the same text:
//! ```text
//! Iter 12
//! Avg Tuple Reward: 0.731
//! solver loss: 0.0451  grad_norm=0.77
//! ```
//! - Training points pair each `Avg Tuple Reward:` line with the most recent
//!   `Iter` line. Rewards seen before any `Iter` line are dropped.
//! - Loss samples come from any line with `loss:` or `loss=`.
//! - Gradient-norm samples come from any line with `grad`, `gradient`,
//!   `grad_norm` or `grad norm` followed by `:` or `=`.
//!
//! The series are not joined: sample `i` of one series says nothing about
//! sample `i` of another.

use crate::error::HarnessError;
use gaitlab_proto::TrainingPoint;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

static ITER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Iter\s+(?P<iter>\d+)\s*$").expect("valid iter regex"));

static REWARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Avg\s+Tuple\s+Reward:\s+(?P<reward>-?\d+(?:\.\d+)?)")
        .expect("valid reward regex")
});

static LOSS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)loss[:=]\s*(?P<loss>-?\d+(?:\.\d+)?)").expect("valid loss regex")
});

static GRAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)grad(?:ient)?(?:_norm| norm)?[:=]\s*(?P<grad>-?\d+(?:\.\d+)?)")
        .expect("valid gradient regex")
});

/// The three metric series extracted from one log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedLog {
    pub points: Vec<TrainingPoint>,
    pub losses: Vec<f64>,
    pub grad_norms: Vec<f64>,
}

/// Parser for simulator log text.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogParser;

impl LogParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses all three series from `text`.
    pub fn parse(&self, text: &str) -> ParsedLog {
        ParsedLog {
            points: self.training_points(text),
            losses: self.loss_series(text),
            grad_norms: self.gradient_norm_series(text),
        }
    }

    /// Reads and parses a log file. Invalid UTF-8 is replaced, not rejected.
    pub fn parse_file(&self, path: &Path) -> Result<ParsedLog, HarnessError> {
        let bytes = std::fs::read(path).map_err(|e| HarnessError::io(path, e))?;
        let text = String::from_utf8_lossy(&bytes);
        let parsed = self.parse(&text);
        debug!(
            log = %path.display(),
            points = parsed.points.len(),
            losses = parsed.losses.len(),
            grad_norms = parsed.grad_norms.len(),
            "Parsed training log"
        );
        Ok(parsed)
    }

    /// Extracts reward samples in emission order.
    pub fn training_points(&self, text: &str) -> Vec<TrainingPoint> {
        let mut points = Vec::new();
        let mut current_iter: Option<u64> = None;

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if let Some(caps) = ITER_RE.captures(line) {
                // An out-of-range iteration number has no context to credit.
                current_iter = caps["iter"].parse::<u64>().ok();
                continue;
            }

            let Some(iteration) = current_iter else {
                continue;
            };
            if let Some(reward) = REWARD_RE
                .captures(line)
                .and_then(|caps| caps["reward"].parse::<f64>().ok())
            {
                points.push(TrainingPoint::new(iteration, reward));
            }
        }

        points
    }

    /// Extracts loss samples in file order.
    pub fn loss_series(&self, text: &str) -> Vec<f64> {
        Self::first_match_per_line(&LOSS_RE, "loss", text)
    }

    /// Extracts gradient-norm samples in file order.
    pub fn gradient_norm_series(&self, text: &str) -> Vec<f64> {
        Self::first_match_per_line(&GRAD_RE, "grad", text)
    }

    fn first_match_per_line(re: &Regex, group: &str, text: &str) -> Vec<f64> {
        text.lines()
            .filter_map(|line| re.captures(line))
            .filter_map(|caps| caps[group].parse::<f64>().ok())
            .collect()
    }
}
