//! Simulator argument files.
//!
//! The simulator is configured exclusively through a line-oriented file:
//! ```text
//! -scenario= train_mace
//! -rand_seed= 7
//! ```
//! Keys are a frozen wire contract and are written exactly as given. Values
//! are not validated; the simulator rejects what it cannot use.

use crate::error::HarnessError;
use std::path::Path;
use tracing::debug;

/// Ordered key/value parameters for one simulator invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentSet {
    entries: Vec<(String, String)>,
}

impl ArgumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter, or replaces the value in place if the key exists.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    /// Builder form of [`ArgumentSet::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Renders the file body: one `-{key}= {value}` line per entry.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push('-');
            out.push_str(key);
            out.push_str("= ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// Writes the set to `path`, overwriting any existing file.
    pub fn write_to(&self, path: &Path) -> Result<(), HarnessError> {
        debug!(path = %path.display(), entries = self.len(), "Writing argument file");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HarnessError::io(parent, e))?;
        }
        std::fs::write(path, self.render()).map_err(|e| HarnessError::io(path, e))
    }

    /// Parses an argument file body. Blank lines are ignored.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut set = Self::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let Some(body) = line.strip_prefix('-') else {
                return Err(format!("line {}: expected leading '-': {line}", idx + 1));
            };
            let Some((key, value)) = body.split_once('=') else {
                return Err(format!("line {}: missing '=': {line}", idx + 1));
            };
            let value = value.strip_prefix(' ').unwrap_or(value);
            set.entries.push((key.to_string(), value.to_string()));
        }
        Ok(set)
    }

    /// Reads an argument file written by [`ArgumentSet::write_to`].
    pub fn read_from(path: &Path) -> Result<Self, HarnessError> {
        let text = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
        Self::parse(&text).map_err(|reason| HarnessError::malformed(path, reason))
    }
}
