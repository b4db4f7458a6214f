//! Architecture template resolution.
//!
//! Every family maps to `policy_{family}.prototxt` inside the configured
//! templates directory. All templates must be present before a run starts.

use crate::error::HarnessError;
use gaitlab_proto::ArchitectureFamily;
use std::path::{Path, PathBuf};

/// Returns the template path for `family`.
pub fn resolve_template(templates_dir: &Path, family: ArchitectureFamily) -> PathBuf {
    templates_dir.join(format!("policy_{}.prototxt", family.as_str()))
}

/// Fails with `MissingTemplate` on the first absent template.
pub fn ensure_templates_exist(templates_dir: &Path) -> Result<(), HarnessError> {
    for family in ArchitectureFamily::ALL {
        let path = resolve_template(templates_dir, family);
        if !path.is_file() {
            return Err(HarnessError::MissingTemplate(path));
        }
    }
    Ok(())
}
