//! One-time conversion of legacy policy assets.
//!
//! Two kinds of update are planned under a repository root:
//! - `args/*.txt` argument files still using the legacy keys `policy_net`
//!   and `policy_solver` get them renamed to `policy_arch_config` and
//!   `policy_checkpoint`. Nothing else in the file changes.
//! - Every `data/policies/**/*.h5` checkpoint without a `.pt` sibling gets
//!   one, as a byte copy.
//!
//! Without `apply` the converter only reports what it would do. Either way the
//! report is written as a JSON manifest, and a second applied run finds
//! nothing left to convert.

use crate::error::{HarnessError, write_json};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default manifest location, relative to the repository root.
pub const CONVERSION_MANIFEST_FILE: &str = "output/legacy_policy_conversion_manifest.json";

/// Legacy argument keys and their replacements.
pub const LEGACY_KEY_RENAMES: [(&str, &str); 2] = [
    ("policy_net", "policy_arch_config"),
    ("policy_solver", "policy_checkpoint"),
];

const ARGS_DIR: &str = "args";
const POLICIES_DIR: &str = "data/policies";

/// An argument file whose legacy keys were (or would be) renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "arg_keys")]
pub struct ArgKeyUpdate {
    pub file: PathBuf,
    pub applied: bool,
}

/// A legacy checkpoint that was (or would be) copied to a `.pt` sibling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "checkpoint_copy")]
pub struct CheckpointCopy {
    pub source: PathBuf,
    pub target: PathBuf,
    pub applied: bool,
}

/// Everything one conversion pass found. Paths are relative to the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub description: String,
    pub dry_run: bool,
    pub arg_updates: Vec<ArgKeyUpdate>,
    pub model_updates: Vec<CheckpointCopy>,
}

impl ConversionReport {
    pub fn is_empty(&self) -> bool {
        self.arg_updates.is_empty() && self.model_updates.is_empty()
    }

    pub fn write_to(&self, path: &Path) -> Result<(), HarnessError> {
        write_json(path, self)
    }
}

/// Renames legacy keys at the start of each line.
///
/// Returns `None` when the text has no legacy key. Line endings and
/// indentation are kept as they are.
pub(crate) fn rename_legacy_keys(text: &str) -> Option<String> {
    let mut changed = false;
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let body = line.trim_start();
        let indent = &line[..line.len() - body.len()];
        let renamed = LEGACY_KEY_RENAMES.iter().find_map(|(old, new)| {
            body.strip_prefix('-')
                .and_then(|rest| rest.strip_prefix(old))
                .filter(|rest| rest.starts_with('='))
                .map(|rest| format!("{indent}-{new}{rest}"))
        });
        match renamed {
            Some(line) => {
                changed = true;
                out.push_str(&line);
            }
            None => out.push_str(line),
        }
    }
    changed.then_some(out)
}

/// Plans and applies the conversion under one repository root.
#[derive(Debug, Clone)]
pub struct LegacyConverter {
    root: PathBuf,
}

impl LegacyConverter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Finds every pending update, performing them when `apply` is set.
    pub fn run(&self, apply: bool) -> Result<ConversionReport, HarnessError> {
        let arg_updates = self.convert_args(apply)?;
        let model_updates = self.convert_checkpoints(apply)?;
        info!(
            root = %self.root.display(),
            apply,
            arg_files = arg_updates.len(),
            checkpoints = model_updates.len(),
            "Legacy policy conversion finished"
        );
        Ok(ConversionReport {
            description: "One-time legacy policy conversion manifest".to_string(),
            dry_run: !apply,
            arg_updates,
            model_updates,
        })
    }

    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root).unwrap_or(path).to_path_buf()
    }

    fn convert_args(&self, apply: bool) -> Result<Vec<ArgKeyUpdate>, HarnessError> {
        let dir = self.root.join(ARGS_DIR);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HarnessError::io(&dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| HarnessError::io(&dir, e))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
                files.push(path);
            }
        }
        files.sort();

        let mut updates = Vec::new();
        for path in files {
            let text = std::fs::read_to_string(&path).map_err(|e| HarnessError::io(&path, e))?;
            let Some(converted) = rename_legacy_keys(&text) else {
                debug!(file = %path.display(), "No legacy keys");
                continue;
            };
            if apply {
                std::fs::write(&path, converted).map_err(|e| HarnessError::io(&path, e))?;
                info!(file = %path.display(), "Renamed legacy argument keys");
            }
            updates.push(ArgKeyUpdate {
                file: self.relative(&path),
                applied: apply,
            });
        }
        Ok(updates)
    }

    fn convert_checkpoints(&self, apply: bool) -> Result<Vec<CheckpointCopy>, HarnessError> {
        let dir = self.root.join(POLICIES_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut updates = Vec::new();
        for entry in walkdir::WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| HarnessError::io(&dir, e.into()))?;
            let source = entry.path();
            if !entry.file_type().is_file() || source.extension().is_none_or(|ext| ext != "h5") {
                continue;
            }
            let target = source.with_extension("pt");
            if target.exists() {
                continue;
            }
            if apply {
                std::fs::copy(source, &target).map_err(|e| HarnessError::io(&target, e))?;
                info!(source = %source.display(), target = %target.display(), "Copied legacy checkpoint");
            }
            updates.push(CheckpointCopy {
                source: self.relative(source),
                target: self.relative(&target),
                applied: apply,
            });
        }
        Ok(updates)
    }
}
