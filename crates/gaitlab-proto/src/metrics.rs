//! Metric records produced from simulator output.

use serde::{Deserialize, Serialize};

/// One reward sample from a training log.
///
/// Sequences of points keep the log's emission order. Iterations are not
/// guaranteed to increase because the simulator may restart internally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingPoint {
    pub iteration: u64,
    pub avg_tuple_reward: f64,
}

impl TrainingPoint {
    pub fn new(iteration: u64, avg_tuple_reward: f64) -> Self {
        Self {
            iteration,
            avg_tuple_reward,
        }
    }
}

/// A field of an evaluation result that violates its documented range.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SummaryError {
    #[error("episodes must be positive, got {0}")]
    NoEpisodes(u64),

    #[error("avg_dist must be a finite non-negative number, got {0}")]
    InvalidDistance(f64),

    #[error("success_rate must lie in [0, 1], got {0}")]
    InvalidSuccessRate(f64),

    #[error("terrain must not be empty")]
    EmptyTerrain,
}

/// Result of evaluating one checkpoint on one terrain with one backend.
///
/// This is the schema of the result file the simulator writes to the
/// `poli_eval_output` location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub terrain: String,
    pub episodes: u64,
    pub avg_dist: f64,
    pub success_rate: f64,
}

impl EvalSummary {
    /// Checks the range constraints a deserialized summary must satisfy.
    pub fn validate(&self) -> Result<(), SummaryError> {
        if self.terrain.trim().is_empty() {
            return Err(SummaryError::EmptyTerrain);
        }
        if self.episodes == 0 {
            return Err(SummaryError::NoEpisodes(self.episodes));
        }
        if !self.avg_dist.is_finite() || self.avg_dist < 0.0 {
            return Err(SummaryError::InvalidDistance(self.avg_dist));
        }
        if !(0.0..=1.0).contains(&self.success_rate) {
            return Err(SummaryError::InvalidSuccessRate(self.success_rate));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(episodes: u64, avg_dist: f64, success_rate: f64) -> EvalSummary {
        EvalSummary {
            terrain: "data/terrain/hills.txt".to_string(),
            episodes,
            avg_dist,
            success_rate,
        }
    }

    #[test]
    fn test_valid_summary_passes() {
        assert!(summary(20, 3.5, 0.75).validate().is_ok());
        assert!(summary(1, 0.0, 0.0).validate().is_ok());
        assert!(summary(1, 0.0, 1.0).validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_fields() {
        assert_eq!(summary(0, 1.0, 0.5).validate(), Err(SummaryError::NoEpisodes(0)));
        assert_eq!(
            summary(5, -0.5, 0.5).validate(),
            Err(SummaryError::InvalidDistance(-0.5))
        );
        assert_eq!(
            summary(5, 1.0, 1.5).validate(),
            Err(SummaryError::InvalidSuccessRate(1.5))
        );
        assert!(matches!(
            summary(5, f64::NAN, 0.5).validate(),
            Err(SummaryError::InvalidDistance(_))
        ));
    }

    #[test]
    fn test_rejects_blank_terrain() {
        let mut s = summary(5, 1.0, 0.5);
        s.terrain = "  ".to_string();
        assert_eq!(s.validate(), Err(SummaryError::EmptyTerrain));
    }

    #[test]
    fn test_summary_deserializes_integer_distance() {
        let s: EvalSummary = serde_json::from_str(
            r#"{"terrain":"flat","episodes":20,"avg_dist":2,"success_rate":1}"#,
        )
        .unwrap();
        assert_eq!(s.avg_dist, 2.0);
        assert_eq!(s.success_rate, 1.0);
    }
}
