//! Parameter contract with the external executor.
//!
//! Every dispatch carries a flat string map that always includes
//! [`PARAM_USER_ID`] and [`PARAM_JOB_ID`], plus operation-specific keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Pipeline that provisions a challenge environment.
pub const PIPELINE_DEPLOY: &str = "deploy_challenge";
/// Pipeline that tears a deployment down.
pub const PIPELINE_DESTROY: &str = "destroy_challenge";
/// Pipeline that runs a challenge's validators against a deployment.
pub const PIPELINE_VALIDATE: &str = "validate_challenge";

pub const PARAM_USER_ID: &str = "USER_ID";
pub const PARAM_JOB_ID: &str = "JOB_ID";
pub const PARAM_CHALLENGE_ID: &str = "CHALLENGE_ID";
pub const PARAM_DEPLOYMENT_ID: &str = "DEPLOYMENT_ID";
pub const PARAM_FLAG: &str = "FLAG";
pub const PARAM_MANIFEST: &str = "MANIFEST";
/// Comma-separated instance handles reported back by a deploy callback.
pub const PARAM_INSTANCE_IDS: &str = "INSTANCE_IDS";
/// JSON array of validation results reported back by a validate callback.
pub const PARAM_RESULTS: &str = "RESULTS";

/// Lifecycle operation a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Deploy,
    Destroy,
    Validate,
}

impl JobKind {
    pub fn pipeline_name(self) -> &'static str {
        match self {
            JobKind::Deploy => PIPELINE_DEPLOY,
            JobKind::Destroy => PIPELINE_DESTROY,
            JobKind::Validate => PIPELINE_VALIDATE,
        }
    }

    /// Resolve an executor job name to a kind.
    ///
    /// Executors may report a folder-qualified name (`ctf/deploy_challenge`);
    /// only the last segment is significant.
    pub fn from_job_name(job_name: &str) -> Option<Self> {
        let name = job_name.rsplit('/').next().unwrap_or(job_name).trim();
        match name {
            PIPELINE_DEPLOY => Some(JobKind::Deploy),
            PIPELINE_DESTROY => Some(JobKind::Destroy),
            PIPELINE_VALIDATE => Some(JobKind::Validate),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Deploy => "deploy",
            JobKind::Destroy => "destroy",
            JobKind::Validate => "validate",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat string-to-string parameters for one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobParameters(BTreeMap<String, String>);

impl JobParameters {
    /// Start a parameter set with the keys every dispatch carries.
    pub fn new(user_id: &str, job_id: &str) -> Self {
        Self::default()
            .with(PARAM_USER_ID, user_id)
            .with(PARAM_JOB_ID, job_id)
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, String>> for JobParameters {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// Split a comma-separated instance list, dropping blanks.
pub fn parse_instance_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
