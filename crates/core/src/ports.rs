//! Capabilities the orchestrator consumes from the outside world.
//!
//! - [`JobDispatcher`] -- triggers a named pipeline on the external executor.
//! - [`ChallengeDeployer`] -- provisions, destroys, and reports on
//!   deployments; either by dispatching pipelines or by calling an
//!   [`InfraProvider`] directly.
//! - [`ValidationRunner`] -- checks a deployment against its manifest.
//!
//! A successful trigger means "accepted for execution". Completion is only
//! ever observed through reconciliation (callback, completion event, poll).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::challenge::Challenge;
use crate::deployment::{Deployment, DeploymentStatus};
use crate::error::CoreError;
use crate::pipeline::JobParameters;
use crate::validation::ValidationDraft;

// ---------------------------------------------------------------------------
// Job handles and states
// ---------------------------------------------------------------------------

/// Opaque identifier returned by the executor for one accepted dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of a job as reported by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalJobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl ExternalJobState {
    /// Parse the status word of a callback or build record, case-insensitively.
    ///
    /// Accepts the executor's build results (`SUCCESS`, `FAILURE`,
    /// `UNSTABLE`, `ABORTED`, `NOT_BUILT`) and plain lifecycle words.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" | "waiting" => Some(Self::Queued),
            "running" | "started" | "building" | "in_progress" => Some(Self::Running),
            "success" | "succeeded" | "finished" | "completed" => Some(Self::Succeeded),
            "failure" | "failed" | "unstable" | "error" => Some(Self::Failed),
            "aborted" | "cancelled" | "canceled" | "not_built" => Some(Self::Aborted),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }

    /// Deployment status implied by this state for a provisioning job.
    pub fn deployment_status(self) -> DeploymentStatus {
        match self {
            Self::Queued => DeploymentStatus::Pending,
            Self::Running => DeploymentStatus::Running,
            Self::Succeeded => DeploymentStatus::Finished,
            Self::Failed | Self::Aborted => DeploymentStatus::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure talking to the executor or the infrastructure provider.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The executor answered but refused the request.
    #[error("Executor rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The executor could not be reached or answered unintelligibly.
    #[error("Executor transport error: {0}")]
    Transport(String),

    /// The handle does not identify a job the executor knows about.
    #[error("Unknown job handle: {0}")]
    UnknownJob(String),

    /// The capability cannot perform this operation.
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    /// The provider reported a failure of the work itself.
    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    /// Validation could not be started (unreadable manifest, spawn failure).
    #[error("Validation could not run: {0}")]
    ValidationSetup(String),
}

impl From<DispatchError> for CoreError {
    fn from(err: DispatchError) -> Self {
        CoreError::Dispatch(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// External executor able to run named pipelines.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Trigger `pipeline` with `params`. Returns once the executor accepted
    /// the job, not when it finished.
    async fn trigger_pipeline(
        &self,
        pipeline: &str,
        params: &JobParameters,
    ) -> Result<JobHandle, DispatchError>;

    /// Current state of a previously dispatched job.
    async fn job_state(&self, handle: &JobHandle) -> Result<ExternalJobState, DispatchError>;
}

// ---------------------------------------------------------------------------
// Deployer
// ---------------------------------------------------------------------------

/// Inputs to a provisioning attempt. The ids are chosen by the orchestrator
/// before the call so the executor can echo them back in callbacks.
#[derive(Debug, Clone, Copy)]
pub struct DeployRequest<'a> {
    pub deployment_id: &'a str,
    pub job_id: &'a str,
    pub user_id: &'a str,
    pub challenge: &'a Challenge,
}

/// What a successful provisioning call produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Provisioned {
    /// Initial deployment status: `running` when infrastructure already
    /// exists, `pending` when it was only accepted for execution.
    pub status: DeploymentStatus,
    pub instance_ids: Vec<String>,
    pub job_handle: Option<JobHandle>,
}

/// Provisions and tears down challenge infrastructure.
#[async_trait]
pub trait ChallengeDeployer: Send + Sync {
    async fn deploy(&self, request: DeployRequest<'_>) -> Result<Provisioned, DispatchError>;

    /// Tear a deployment down. Returns the job handle when the teardown was
    /// dispatched rather than performed inline.
    async fn destroy(
        &self,
        deployment: &Deployment,
        job_id: &str,
    ) -> Result<Option<JobHandle>, DispatchError>;

    /// Live status of a deployment as seen by the infrastructure.
    async fn status(&self, deployment: &Deployment) -> Result<DeploymentStatus, DispatchError>;
}

// ---------------------------------------------------------------------------
// Infrastructure provider
// ---------------------------------------------------------------------------

/// State of one provisioned instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Provisioning,
    Running,
    Stopped,
    Failed,
    Missing,
}

/// Direct access to the infrastructure that hosts challenge instances.
#[async_trait]
pub trait InfraProvider: Send + Sync {
    /// Create the instances for `challenge` and return their handles.
    async fn provision(
        &self,
        challenge: &Challenge,
        user_id: &str,
    ) -> Result<Vec<String>, DispatchError>;

    async fn terminate(&self, instance_id: &str) -> Result<(), DispatchError>;

    async fn instance_state(&self, instance_id: &str) -> Result<InstanceState, DispatchError>;
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Inputs to one validation attempt.
#[derive(Debug, Clone, Copy)]
pub struct ValidationRequest<'a> {
    pub deployment: &'a Deployment,
    /// Manifest locator of the deployment's challenge.
    pub manifest: &'a str,
    /// Submitted flag, absent for checks triggered by a completion event.
    pub flag: Option<&'a str>,
    pub job_id: &'a str,
}

/// Outcome of asking a runner to validate.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationRun {
    /// Results were produced inline.
    Completed(Vec<ValidationDraft>),
    /// Validation was dispatched; results arrive through reconciliation.
    Dispatched(JobHandle),
}

#[async_trait]
pub trait ValidationRunner: Send + Sync {
    async fn run(&self, request: ValidationRequest<'_>) -> Result<ValidationRun, DispatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_state_parses_executor_words() {
        assert_eq!(ExternalJobState::parse("SUCCESS"), Some(ExternalJobState::Succeeded));
        assert_eq!(ExternalJobState::parse("success"), Some(ExternalJobState::Succeeded));
        assert_eq!(ExternalJobState::parse("UNSTABLE"), Some(ExternalJobState::Failed));
        assert_eq!(ExternalJobState::parse("ABORTED"), Some(ExternalJobState::Aborted));
        assert_eq!(ExternalJobState::parse(" started "), Some(ExternalJobState::Running));
        assert_eq!(ExternalJobState::parse("weird"), None);
    }

    #[test]
    fn external_state_maps_to_deployment_status() {
        assert_eq!(
            ExternalJobState::Queued.deployment_status(),
            DeploymentStatus::Pending
        );
        assert_eq!(
            ExternalJobState::Aborted.deployment_status(),
            DeploymentStatus::Failed
        );
        assert!(ExternalJobState::Failed.is_terminal());
        assert!(!ExternalJobState::Running.is_terminal());
    }

    #[test]
    fn dispatch_error_converts_to_core_dispatch() {
        let err: CoreError = DispatchError::Rejected {
            status: 403,
            body: "No valid crumb".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Dispatch(msg) if msg.contains("403")));
    }
}
