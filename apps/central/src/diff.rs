use std::{collections::HashSet, fs, io, path::Path};

use checkup::Check;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
    #[error("check {0} has no id")]
    EmptyId(usize),
    #[error("check {0} is added more than once")]
    DuplicateAddition(String),
}

/// Checks to add and check ids to remove across the fleet.
///
/// Removals are applied before additions, so a check that is both removed
/// and added is moved to the least loaded agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckDiff {
    pub additions: Vec<Check>,
    pub removals: Vec<String>,
}

impl CheckDiff {
    pub fn from_file(path: &Path) -> Result<Self, DiffError> {
        let display = path.display().to_string();
        let raw = fs::read_to_string(path)
            .map_err(|source| DiffError::Read { path: display.clone(), source })?;
        let diff: Self = toml::from_str(&raw).map_err(|source| DiffError::Parse { path: display, source })?;
        diff.validate()?;
        Ok(diff)
    }

    fn validate(&self) -> Result<(), DiffError> {
        let mut seen = HashSet::new();
        for (index, check) in self.additions.iter().enumerate() {
            if check.id.is_empty() {
                return Err(DiffError::EmptyId(index));
            }
            if !seen.insert(check.id.as_str()) {
                return Err(DiffError::DuplicateAddition(check.id.clone()));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }
}
