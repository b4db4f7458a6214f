//! Run directory allocation.
//!
//! A run directory is named `{name}_{algorithm}_seed{seed}_{UTC timestamp}`
//! at second granularity. When two invocations with the same identity land
//! in the same second, the later one gets a `-2`, `-3`, ... suffix instead of
//! writing into the earlier run's directory.

use crate::config::ExperimentConfig;
use crate::error::HarnessError;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Timestamp format embedded in run directory names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Upper bound on collision suffixes before giving up.
const MAX_SUFFIX: u32 = 1000;

/// Derives and creates run directories under an output root.
#[derive(Debug, Clone)]
pub struct RunDirectoryAllocator {
    output_root: PathBuf,
}

impl RunDirectoryAllocator {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    /// Returns the base name for a run of `config` started at `started_at`.
    pub fn run_name(config: &ExperimentConfig, started_at: DateTime<Utc>) -> String {
        format!(
            "{}_{}_seed{}_{}",
            config.name,
            config.algorithm,
            config.seed,
            started_at.format(TIMESTAMP_FORMAT)
        )
    }

    /// Creates the run directory for `config` and returns its path.
    ///
    /// Parent directories are created as needed. An existing empty directory
    /// with the base name is taken over; a non-empty one is never reused.
    pub fn allocate(
        &self,
        config: &ExperimentConfig,
        started_at: DateTime<Utc>,
    ) -> Result<PathBuf, HarnessError> {
        std::fs::create_dir_all(&self.output_root)
            .map_err(|e| HarnessError::io(&self.output_root, e))?;

        let base = Self::run_name(config, started_at);
        for attempt in 1..=MAX_SUFFIX {
            let name = if attempt == 1 {
                base.clone()
            } else {
                format!("{base}-{attempt}")
            };
            let candidate = self.output_root.join(&name);
            match std::fs::create_dir(&candidate) {
                Ok(()) => {
                    info!(run_dir = %candidate.display(), "Allocated run directory");
                    return Ok(candidate);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_empty_dir(&candidate)? {
                        info!(run_dir = %candidate.display(), "Reusing empty run directory");
                        return Ok(candidate);
                    }
                    debug!(run_dir = %candidate.display(), "Run directory taken, trying next suffix");
                }
                Err(e) => return Err(HarnessError::io(&candidate, e)),
            }
        }

        Err(HarnessError::io(
            self.output_root.join(&base),
            std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("{MAX_SUFFIX} run directories already exist for this identity and second"),
            ),
        ))
    }
}

fn is_empty_dir(path: &Path) -> Result<bool, HarnessError> {
    if !path.is_dir() {
        return Ok(false);
    }
    let mut entries = std::fs::read_dir(path).map_err(|e| HarnessError::io(path, e))?;
    Ok(entries.next().is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gaitlab_proto::ArchitectureFamily;
    use tempfile::TempDir;

    fn config() -> ExperimentConfig {
        ExperimentConfig::new(
            "dog_walk",
            "mace",
            42,
            "bin",
            ArchitectureFamily::MlpBaseline,
            vec!["flat.txt".to_string()],
        )
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 5).unwrap()
    }

    #[test]
    fn test_run_name_format() {
        assert_eq!(
            RunDirectoryAllocator::run_name(&config(), noon()),
            "dog_walk_mace_seed42_20260314T120005Z"
        );
    }

    #[test]
    fn test_allocate_creates_parents() {
        let root = TempDir::new().unwrap();
        let allocator = RunDirectoryAllocator::new(root.path().join("a").join("b"));
        let dir = allocator.allocate(&config(), noon()).unwrap();
        assert!(dir.is_dir());
        assert!(dir.ends_with("dog_walk_mace_seed42_20260314T120005Z"));
    }

    #[test]
    fn test_same_second_collision_gets_suffix() {
        let root = TempDir::new().unwrap();
        let allocator = RunDirectoryAllocator::new(root.path());

        let first = allocator.allocate(&config(), noon()).unwrap();
        std::fs::write(first.join("train.log"), "Iter 0\n").unwrap();
        let second = allocator.allocate(&config(), noon()).unwrap();
        std::fs::write(second.join("train.log"), "Iter 0\n").unwrap();
        let third = allocator.allocate(&config(), noon()).unwrap();

        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("-2"));
        assert!(third.to_string_lossy().ends_with("-3"));
    }

    #[test]
    fn test_existing_empty_directory_is_reused() {
        let root = TempDir::new().unwrap();
        let allocator = RunDirectoryAllocator::new(root.path());
        let first = allocator.allocate(&config(), noon()).unwrap();
        let again = allocator.allocate(&config(), noon()).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_different_seconds_get_distinct_directories() {
        let root = TempDir::new().unwrap();
        let allocator = RunDirectoryAllocator::new(root.path());
        let a = allocator.allocate(&config(), noon()).unwrap();
        let b = allocator
            .allocate(&config(), noon() + chrono::Duration::seconds(1))
            .unwrap();
        assert_ne!(a, b);
    }
}
