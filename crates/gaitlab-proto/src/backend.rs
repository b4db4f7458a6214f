//! Closed sets of names the simulator understands.
//!
//! Both enums serialize to the exact strings written into argument files,
//! so the serde names double as wire values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a backend or architecture name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct ParseNameError {
    kind: &'static str,
    value: String,
    expected: String,
}

impl ParseNameError {
    fn new(kind: &'static str, value: &str, expected: &[&str]) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected: expected.join(", "),
        }
    }
}

/// Execution engine the simulator uses for policy inference and training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PolicyBackend {
    /// The engine being retired.
    #[default]
    #[serde(rename = "legacy_caffe")]
    LegacyCaffe,
    /// The replacement engine.
    #[serde(rename = "modern_backend")]
    Modern,
}

impl PolicyBackend {
    /// All backends, legacy first.
    pub const ALL: [PolicyBackend; 2] = [PolicyBackend::LegacyCaffe, PolicyBackend::Modern];

    /// Returns the wire name passed to the simulator.
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyBackend::LegacyCaffe => "legacy_caffe",
            PolicyBackend::Modern => "modern_backend",
        }
    }

    /// Returns true for the backend the migration wants to remove.
    pub fn is_legacy(self) -> bool {
        matches!(self, PolicyBackend::LegacyCaffe)
    }
}

impl fmt::Display for PolicyBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyBackend {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|backend| backend.as_str() == s)
            .ok_or_else(|| {
                ParseNameError::new("backend", s, &Self::ALL.map(PolicyBackend::as_str))
            })
    }
}

/// Neural architecture family a policy is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchitectureFamily {
    MlpBaseline,
    CnnBaseline,
    TerrainAttention,
}

impl ArchitectureFamily {
    pub const ALL: [ArchitectureFamily; 3] = [
        ArchitectureFamily::MlpBaseline,
        ArchitectureFamily::CnnBaseline,
        ArchitectureFamily::TerrainAttention,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArchitectureFamily::MlpBaseline => "mlp_baseline",
            ArchitectureFamily::CnnBaseline => "cnn_baseline",
            ArchitectureFamily::TerrainAttention => "terrain_attention",
        }
    }
}

impl fmt::Display for ArchitectureFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchitectureFamily {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|family| family.as_str() == s)
            .ok_or_else(|| {
                ParseNameError::new(
                    "architecture family",
                    s,
                    &Self::ALL.map(ArchitectureFamily::as_str),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_wire_names_match_serde() {
        for backend in PolicyBackend::ALL {
            let json = serde_json::to_string(&backend).unwrap();
            assert_eq!(json, format!("\"{}\"", backend.as_str()));
            assert_eq!(backend.as_str().parse::<PolicyBackend>().unwrap(), backend);
        }
    }

    #[test]
    fn test_default_backend_is_legacy() {
        assert!(PolicyBackend::default().is_legacy());
        assert!(!PolicyBackend::Modern.is_legacy());
    }

    #[test]
    fn test_unknown_backend_lists_choices() {
        let err = "tensorflow".parse::<PolicyBackend>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("tensorflow"));
        assert!(msg.contains("legacy_caffe, modern_backend"));
    }

    #[test]
    fn test_architecture_family_round_trips_through_str() {
        for family in ArchitectureFamily::ALL {
            assert_eq!(family.as_str().parse::<ArchitectureFamily>().unwrap(), family);
        }
        let parsed: ArchitectureFamily = serde_json::from_str("\"terrain_attention\"").unwrap();
        assert_eq!(parsed, ArchitectureFamily::TerrainAttention);
        assert!("transformer".parse::<ArchitectureFamily>().is_err());
    }
}
