//! Error type for harness operations.

use crate::config::ConfigError;
use std::path::{Path, PathBuf};

/// Errors that abort a harness invocation.
///
/// Artifacts written before the failure stay on disk; nothing is rolled back.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Missing architecture template: {0}")]
    MissingTemplate(PathBuf),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to launch simulator {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} failed ({}); see {log}", describe_exit(.exit_code, .timed_out))]
    ProcessFailed {
        stage: String,
        exit_code: Option<i32>,
        timed_out: bool,
        log: PathBuf,
    },

    #[error("Missing artifact: {0}")]
    MissingArtifact(PathBuf),

    #[error("Malformed artifact {path}: {reason}")]
    MalformedArtifact { path: PathBuf, reason: String },

    #[error("Failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl HarnessError {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        HarnessError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        HarnessError::MalformedArtifact {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

fn describe_exit(exit_code: &Option<i32>, timed_out: &bool) -> String {
    match (*timed_out, *exit_code) {
        (true, _) => "timed out".to_string(),
        (false, Some(code)) => format!("exit code {code}"),
        (false, None) => "terminated by signal".to_string(),
    }
}

/// Writes `value` as pretty JSON.
///
/// The bytes go to a sibling temp file that is then renamed over `path`, so
/// readers see either the previous file or the complete new one.
pub(crate) fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), HarnessError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| HarnessError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        std::fs::create_dir_all(parent).map_err(|e| HarnessError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_name = format!(".{file_name}.tmp.{}", std::process::id());
    let tmp = match parent {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    };

    if let Err(e) = std::fs::write(&tmp, bytes) {
        let _ = std::fs::remove_file(&tmp);
        return Err(HarnessError::io(&tmp, e));
    }
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        HarnessError::io(path, e)
    })
}
