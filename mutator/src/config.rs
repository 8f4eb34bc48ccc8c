use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::HarnessError;
use crate::interp::Limits;

/// Everything that shapes a verification run. Every field may be omitted
/// from a TOML file.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct VerifyConfig {
    /// Run variants at all, or only check the baselines.
    pub enable_mutation: bool,
    pub random_seed: u64,
    pub show_rewritten_source: bool,
    pub show_diff: bool,
    /// Report failures only.
    pub quiet: bool,
    /// Report every rewrite and random draw.
    pub verbose: bool,
    /// Treat the input path as a directory and walk it.
    pub recursive: bool,
    /// File extension picked up in recursive mode, without the dot.
    pub extension: String,
    /// Wall-clock bound on a single execution.
    pub timeout_secs: u64,
    /// Interpreter step bound on a single execution.
    pub step_limit: Option<u64>,
    /// Strategy names to run. Empty means all of them.
    pub only: Vec<String>,
    /// Directory that receives the source of every failing variant.
    pub save_failures: Option<PathBuf>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            enable_mutation: true,
            random_seed: 42,
            show_rewritten_source: false,
            show_diff: false,
            quiet: false,
            verbose: false,
            recursive: false,
            extension: "eh".to_string(),
            timeout_secs: 10,
            step_limit: None,
            only: vec![],
            save_failures: None,
        }
    }
}

impl VerifyConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, HarnessError> {
        toml::from_str(text).map_err(|e| HarnessError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let text = fs::read_to_string(path).map_err(|source| HarnessError::InputAccess {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Execution bounds for the in-process interpreter.
    pub fn limits(&self) -> Limits {
        let defaults = Limits::default();
        Limits {
            step_limit: self.step_limit.unwrap_or(defaults.step_limit),
            time_limit: Duration::from_secs(self.timeout_secs),
            ..defaults
        }
    }
}
