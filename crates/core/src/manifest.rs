//! Validator manifests.
//!
//! A manifest is a YAML document listing the checks that decide whether a
//! deployment is solved:
//!
//! ```yaml
//! step_validator:
//!   - step: 1
//!     title: Service is up
//!     validations:
//!       - name: port open
//!         command: "nc -z localhost 8080 && echo open"
//!         expected_output: open
//!         success_message: Service reachable
//!         failure_message: Service is not listening
//!         timeout: 10
//! ```
//!
//! Each validation names exactly one expectation: `expected_output`
//! (trimmed equality) or `expected_pattern` (regex search).

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed manifest: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid manifest: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorManifest {
    pub step_validator: Vec<ValidationStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStep {
    pub step: i32,
    #[serde(default)]
    pub title: String,
    pub validations: Vec<ValidationCheck>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub expected_pattern: Option<String>,
    #[serde(default)]
    pub success_message: String,
    #[serde(default)]
    pub failure_message: String,
    /// Per-command timeout in seconds; the runner default applies when unset.
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// How a check's output is judged.
#[derive(Debug, Clone)]
pub enum Expectation {
    Exact(String),
    Pattern(Regex),
}

impl Expectation {
    /// Judge `output` after trimming surrounding whitespace.
    pub fn matches(&self, output: &str) -> bool {
        let output = output.trim();
        match self {
            Expectation::Exact(expected) => output == expected,
            Expectation::Pattern(re) => re.is_match(output),
        }
    }
}

impl ValidationCheck {
    /// Resolve the expectation; `expected_output` wins when both are set.
    pub fn expectation(&self) -> Result<Expectation, ManifestError> {
        if let Some(expected) = &self.expected_output {
            return Ok(Expectation::Exact(expected.trim().to_string()));
        }
        if let Some(pattern) = &self.expected_pattern {
            let re = Regex::new(pattern).map_err(|e| {
                ManifestError::Invalid(format!("validation '{}' has a bad pattern: {e}", self.name))
            })?;
            return Ok(Expectation::Pattern(re));
        }
        Err(ManifestError::Invalid(format!(
            "validation '{}' has neither expected_output nor expected_pattern",
            self.name
        )))
    }

    /// Message to record for a pass or a fail.
    pub fn message_for(&self, ok: bool) -> &str {
        if ok {
            &self.success_message
        } else {
            &self.failure_message
        }
    }
}

impl ValidatorManifest {
    /// Parse and check a manifest document.
    pub fn from_yaml(source: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_yaml::from_str(source)?;
        manifest.check()?;
        Ok(manifest)
    }

    /// Read and parse the manifest at `path`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ManifestError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_yaml(&source)
    }

    /// Number of validations across all steps.
    pub fn check_count(&self) -> usize {
        self.step_validator.iter().map(|s| s.validations.len()).sum()
    }

    fn check(&self) -> Result<(), ManifestError> {
        if self.step_validator.is_empty() {
            return Err(ManifestError::Invalid("no steps defined".into()));
        }
        for step in &self.step_validator {
            if step.validations.is_empty() {
                return Err(ManifestError::Invalid(format!(
                    "step {} has no validations",
                    step.step
                )));
            }
            for check in &step.validations {
                if check.command.trim().is_empty() {
                    return Err(ManifestError::Invalid(format!(
                        "validation '{}' has an empty command",
                        check.name
                    )));
                }
                check.expectation()?;
            }
        }
        Ok(())
    }
}
