//! Folds asynchronous job outcomes into persisted deployments.
//!
//! Both transports (the executor's webhook and the completion queue)
//! translate their payload into a [`JobOutcome`] and call
//! [`Reconciler::apply`]. Applying the same outcome twice leaves the same
//! state as applying it once: status moves only along legal edges, and
//! callback results carry ids derived from the job, so a replay appends
//! nothing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chalops_core::deployment::{Deployment, DeploymentStatus};
use chalops_core::error::{CoreError, CoreResult};
use chalops_core::pipeline::{
    parse_instance_ids, JobKind, PARAM_DEPLOYMENT_ID, PARAM_INSTANCE_IDS, PARAM_JOB_ID,
    PARAM_RESULTS,
};
use chalops_core::ports::ExternalJobState;
use chalops_core::types::new_id;
use chalops_core::validation::{callback_result_id, ValidationDraft};
use chalops_db::{ChallengeStore, StoreError};
use chalops_events::{CompletionEvent, CompletionHandler};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{modify_deployment, DeploymentOrchestrator};

// ---------------------------------------------------------------------------
// Outcome shape
// ---------------------------------------------------------------------------

/// Transport-neutral description of a finished (or progressing) job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub kind: JobKind,
    pub state: ExternalJobState,
    /// Deployment named by the job's parameters, when present.
    pub deployment_id: Option<String>,
    /// Handles the job may have been recorded under, tried in order when
    /// `deployment_id` is absent.
    pub job_keys: Vec<String>,
    /// Correlation id of the job; callback result ids derive from it.
    pub job_id: String,
    pub instance_ids: Vec<String>,
    pub results: Vec<ValidationDraft>,
}

impl JobOutcome {
    pub fn new(kind: JobKind, state: ExternalJobState, job_id: impl Into<String>) -> Self {
        Self {
            kind,
            state,
            deployment_id: None,
            job_keys: Vec::new(),
            job_id: job_id.into(),
            instance_ids: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn for_deployment(mut self, deployment_id: impl Into<String>) -> Self {
        self.deployment_id = Some(deployment_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileResult {
    /// The deployment or its results changed.
    Applied(Deployment),
    /// Nothing to change: a replay, a stale outcome, or a non-terminal
    /// progress report.
    NoOp(Deployment),
    /// No deployment matches the outcome.
    UnknownDeployment,
    /// The payload does not describe a job this service dispatches.
    Ignored(String),
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler {
    store: Arc<dyn ChallengeStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ChallengeStore>) -> Self {
        Self { store }
    }

    pub async fn apply(&self, outcome: &JobOutcome) -> CoreResult<ReconcileResult> {
        let Some(deployment) = self.resolve(outcome).await? else {
            tracing::warn!(
                kind = %outcome.kind,
                job_id = %outcome.job_id,
                deployment_id = ?outcome.deployment_id,
                "Outcome does not match any deployment",
            );
            return Ok(ReconcileResult::UnknownDeployment);
        };

        let result = match outcome.kind {
            JobKind::Deploy => self.apply_deploy(deployment, outcome).await?,
            JobKind::Destroy => self.apply_destroy(deployment, outcome).await?,
            JobKind::Validate => self.apply_validate(deployment, outcome).await?,
        };

        match &result {
            ReconcileResult::Applied(d) => tracing::info!(
                deployment_id = %d.id,
                kind = %outcome.kind,
                state = ?outcome.state,
                status = %d.status,
                "Outcome applied",
            ),
            ReconcileResult::NoOp(d) => tracing::debug!(
                deployment_id = %d.id,
                kind = %outcome.kind,
                state = ?outcome.state,
                status = %d.status,
                "Outcome changed nothing",
            ),
            _ => {}
        }
        Ok(result)
    }

    async fn resolve(&self, outcome: &JobOutcome) -> CoreResult<Option<Deployment>> {
        if let Some(id) = outcome.deployment_id.as_deref().filter(|id| !id.is_empty()) {
            return match self.store.get_deployment(id).await {
                Ok(deployment) => Ok(Some(deployment)),
                Err(StoreError::NotFound { .. }) => Ok(None),
                Err(e) => Err(e.into()),
            };
        }
        for key in &outcome.job_keys {
            if let Some(deployment) = self.store.find_deployment_by_job(key).await? {
                return Ok(Some(deployment));
            }
        }
        Ok(None)
    }

    /// Move toward the status implied by the job state. A target that is
    /// not reachable from the stored status is a stale or replayed report.
    async fn apply_deploy(
        &self,
        deployment: Deployment,
        outcome: &JobOutcome,
    ) -> CoreResult<ReconcileResult> {
        let target = outcome.state.deployment_status();
        let (stored, changed) = modify_deployment(self.store.as_ref(), deployment, |d| {
            let Some(path) = d.status.path_to(target) else {
                return Ok(false);
            };
            let mut changed = d.merge_instances(outcome.instance_ids.iter().cloned());
            if !path.is_empty() {
                d.advance_to(target)?;
                changed = true;
            }
            Ok(changed)
        })
        .await?;
        Ok(wrap(stored, changed))
    }

    /// The orchestrator marks a deployment destroyed once the teardown was
    /// accepted, so a successful destroy callback is normally a replay. A
    /// failed teardown leaves the status alone.
    async fn apply_destroy(
        &self,
        deployment: Deployment,
        outcome: &JobOutcome,
    ) -> CoreResult<ReconcileResult> {
        match outcome.state {
            ExternalJobState::Succeeded => {
                let (stored, changed) = modify_deployment(self.store.as_ref(), deployment, |d| {
                    if !d.status.can_transition_to(DeploymentStatus::Destroyed) {
                        return Ok(false);
                    }
                    d.transition_to(DeploymentStatus::Destroyed)?;
                    Ok(true)
                })
                .await?;
                Ok(wrap(stored, changed))
            }
            state if state.is_terminal() => {
                tracing::warn!(
                    deployment_id = %deployment.id,
                    ?state,
                    "Destroy job did not succeed, deployment keeps its status",
                );
                Ok(ReconcileResult::NoOp(deployment))
            }
            _ => Ok(ReconcileResult::NoOp(deployment)),
        }
    }

    /// Append the reported results. Without explicit results, a terminal
    /// state is recorded as a single result.
    async fn apply_validate(
        &self,
        deployment: Deployment,
        outcome: &JobOutcome,
    ) -> CoreResult<ReconcileResult> {
        let drafts: Vec<ValidationDraft> = if !outcome.results.is_empty() {
            outcome.results.clone()
        } else if outcome.state.is_terminal() {
            let ok = outcome.state == ExternalJobState::Succeeded;
            vec![ValidationDraft {
                step: 1,
                name: "validation".to_string(),
                ok,
                message: if ok { "Validation passed" } else { "Validation failed" }.to_string(),
                output: format!("{:?}", outcome.state).to_lowercase(),
            }]
        } else {
            return Ok(ReconcileResult::NoOp(deployment));
        };

        let mut appended = 0;
        for (index, draft) in drafts.into_iter().enumerate() {
            let id = callback_result_id(&outcome.job_id, draft.step, index);
            let result = draft.into_result(id, deployment.id.as_str(), outcome.job_id.as_str());
            if self.store.save_validation_result(&result).await? {
                appended += 1;
            }
        }
        Ok(wrap(deployment, appended > 0))
    }
}

fn wrap(deployment: Deployment, changed: bool) -> ReconcileResult {
    if changed {
        ReconcileResult::Applied(deployment)
    } else {
        ReconcileResult::NoOp(deployment)
    }
}

// ---------------------------------------------------------------------------
// Webhook adapter
// ---------------------------------------------------------------------------

/// Body of `POST /jenkins/webhook`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub job_name: String,
    #[serde(default)]
    pub build_number: Option<i64>,
    /// Queue item id of the build, when the notifier reports it.
    #[serde(default)]
    pub queue_id: Option<i64>,
    pub status: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

impl WebhookPayload {
    /// Parameter value as a string. Numbers and booleans are stringified;
    /// null and absent keys yield `None`.
    pub fn param(&self, key: &str) -> Option<String> {
        match self.params.get(key)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Translate into an outcome. `Ok(Err(reason))` means the payload is
    /// well-formed but not ours to act on.
    pub fn to_outcome(&self) -> CoreResult<Result<JobOutcome, String>> {
        let Some(kind) = JobKind::from_job_name(&self.job_name) else {
            return Ok(Err(format!("unknown job {}", self.job_name)));
        };
        let Some(state) = ExternalJobState::parse(&self.status) else {
            return Ok(Err(format!("unrecognized status {}", self.status)));
        };

        // Handles are recorded by queue id. Build numbers are a separate
        // counter and never resolve a deployment.
        let pipeline = kind.pipeline_name();
        let job_keys: Vec<String> = self
            .queue_id
            .map(|queue_id| format!("{pipeline}#{queue_id}"))
            .into_iter()
            .collect();

        let job_id = self
            .param(PARAM_JOB_ID)
            .filter(|id| !id.is_empty())
            .or_else(|| job_keys.first().cloned())
            .or_else(|| self.build_number.map(|build| format!("{pipeline}/build#{build}")))
            .unwrap_or_else(new_id);

        let mut outcome = JobOutcome::new(kind, state, job_id);
        outcome.deployment_id = self.param(PARAM_DEPLOYMENT_ID).filter(|id| !id.is_empty());
        outcome.job_keys = job_keys;
        outcome.instance_ids = self
            .param(PARAM_INSTANCE_IDS)
            .map(|raw| parse_instance_ids(&raw))
            .unwrap_or_default();
        outcome.results = self.results()?;
        Ok(Ok(outcome))
    }

    /// `RESULTS` may be a JSON array or a string holding one.
    fn results(&self) -> CoreResult<Vec<ValidationDraft>> {
        let parsed = match self.params.get(PARAM_RESULTS) {
            None | Some(serde_json::Value::Null) => return Ok(Vec::new()),
            Some(serde_json::Value::String(raw)) if raw.trim().is_empty() => return Ok(Vec::new()),
            Some(serde_json::Value::String(raw)) => serde_json::from_str(raw),
            Some(value) => serde_json::from_value(value.clone()),
        };
        parsed.map_err(|e| CoreError::Validation(format!("{PARAM_RESULTS} is malformed: {e}")))
    }
}

impl Reconciler {
    /// Reconcile one executor callback.
    pub async fn handle_webhook(&self, payload: &WebhookPayload) -> CoreResult<ReconcileResult> {
        tracing::info!(
            job_name = %payload.job_name,
            build_number = ?payload.build_number,
            status = %payload.status,
            "Executor callback received",
        );
        match payload.to_outcome()? {
            Ok(outcome) => self.apply(&outcome).await,
            Err(reason) => {
                tracing::warn!(job_name = %payload.job_name, %reason, "Callback ignored");
                Ok(ReconcileResult::Ignored(reason))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Completion-queue adapter
// ---------------------------------------------------------------------------

/// Handles "deployment finished" events: the deployment is running once
/// its provisioning completed, then it is validated without a flag.
pub struct CompletionReconciler {
    reconciler: Arc<Reconciler>,
    orchestrator: Arc<DeploymentOrchestrator>,
}

impl CompletionReconciler {
    pub fn new(reconciler: Arc<Reconciler>, orchestrator: Arc<DeploymentOrchestrator>) -> Self {
        Self {
            reconciler,
            orchestrator,
        }
    }
}

impl CompletionReconciler {
    async fn already_validated(&self, deployment_id: &str, job_id: &str) -> CoreResult<bool> {
        let results = self
            .orchestrator
            .store()
            .get_validation_results(deployment_id)
            .await?;
        Ok(results.iter().any(|r| r.job_id == job_id))
    }
}

#[async_trait]
impl CompletionHandler for CompletionReconciler {
    async fn handle(&self, event: &CompletionEvent) -> Result<(), CoreError> {
        let Some(state) = ExternalJobState::parse(&event.status) else {
            tracing::warn!(
                deployment_id = %event.deployment_id,
                status = %event.status,
                "Completion event with unrecognized status dropped",
            );
            return Ok(());
        };
        // Finished provisioning means the environment is up.
        let state = match state {
            ExternalJobState::Succeeded => ExternalJobState::Running,
            other => other,
        };

        // One validation job per event, so a redelivery reuses its result ids.
        let job_id = format!(
            "completion:{}:{}",
            event.deployment_id,
            event.status.trim().to_ascii_lowercase()
        );
        let outcome = JobOutcome::new(JobKind::Deploy, state, job_id.as_str())
            .for_deployment(event.deployment_id.as_str());

        let (deployment, applied) = match self.reconciler.apply(&outcome).await? {
            ReconcileResult::Applied(d) => (d, true),
            ReconcileResult::NoOp(d) => (d, false),
            ReconcileResult::UnknownDeployment | ReconcileResult::Ignored(_) => {
                return Err(CoreError::not_found("Deployment", event.deployment_id.as_str()));
            }
        };

        if !matches!(
            deployment.status,
            DeploymentStatus::Running | DeploymentStatus::Finished
        ) {
            return Ok(());
        }
        if !applied && self.already_validated(&deployment.id, &job_id).await? {
            tracing::debug!(
                deployment_id = %event.deployment_id,
                %job_id,
                "Completion event replayed, validation already recorded",
            );
            return Ok(());
        }

        let validation = self
            .orchestrator
            .validate_system(&CancellationToken::new(), deployment, &job_id)
            .await?;
        tracing::info!(
            deployment_id = %event.deployment_id,
            job_id = %validation.job_id,
            results = validation.results.len(),
            "Post-deployment validation triggered",
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(value: serde_json::Value) -> WebhookPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn payload_maps_to_outcome() {
        let p = payload(json!({
            "jobName": "ctf/deploy_challenge",
            "buildNumber": 12,
            "queueId": 101,
            "status": "SUCCESS",
            "params": {"DEPLOYMENT_ID": "d1", "JOB_ID": "j1", "INSTANCE_IDS": "i-1, i-2"}
        }));
        let outcome = p.to_outcome().unwrap().unwrap();
        assert_eq!(outcome.kind, JobKind::Deploy);
        assert_eq!(outcome.state, ExternalJobState::Succeeded);
        assert_eq!(outcome.deployment_id.as_deref(), Some("d1"));
        assert_eq!(outcome.job_id, "j1");
        assert_eq!(outcome.job_keys, vec!["deploy_challenge#101"]);
        assert_eq!(outcome.instance_ids, vec!["i-1", "i-2"]);
    }

    #[test]
    fn build_number_is_not_a_lookup_key() {
        let p = payload(json!({
            "jobName": "deploy_challenge",
            "buildNumber": 101,
            "status": "FAILURE"
        }));
        let outcome = p.to_outcome().unwrap().unwrap();
        assert!(outcome.job_keys.is_empty());
        assert_eq!(outcome.job_id, "deploy_challenge/build#101");
    }

    #[test]
    fn uncorrelated_callbacks_get_distinct_job_ids() {
        let p = payload(json!({
            "jobName": "validate_challenge",
            "status": "SUCCESS",
            "params": {"DEPLOYMENT_ID": "d1"}
        }));
        let first = p.to_outcome().unwrap().unwrap();
        let second = p.to_outcome().unwrap().unwrap();
        assert_ne!(first.job_id, "validate_challenge");
        assert_ne!(first.job_id, second.job_id);
    }

    #[test]
    fn unknown_job_or_status_is_ignored() {
        let p = payload(json!({"jobName": "nightly", "status": "SUCCESS"}));
        assert!(p.to_outcome().unwrap().is_err());
        let p = payload(json!({"jobName": "deploy_challenge", "status": "???"}));
        assert!(p.to_outcome().unwrap().is_err());
    }

    #[test]
    fn results_accept_array_or_string() {
        let p = payload(json!({
            "jobName": "validate_challenge",
            "status": "SUCCESS",
            "params": {"RESULTS": [{"name": "flag", "ok": true}]}
        }));
        assert_eq!(p.to_outcome().unwrap().unwrap().results.len(), 1);

        let p = payload(json!({
            "jobName": "validate_challenge",
            "status": "SUCCESS",
            "params": {"RESULTS": "[{\"step\": 2, \"name\": \"port\", \"ok\": false}]"}
        }));
        let results = p.to_outcome().unwrap().unwrap().results;
        assert_eq!(results[0].step, 2);
        assert!(!results[0].ok);
    }

    #[test]
    fn malformed_results_are_rejected() {
        let p = payload(json!({
            "jobName": "validate_challenge",
            "status": "SUCCESS",
            "params": {"RESULTS": "not json"}
        }));
        assert!(matches!(p.to_outcome(), Err(CoreError::Validation(_))));
    }

    #[test]
    fn numeric_params_are_stringified() {
        let p = payload(json!({
            "jobName": "deploy_challenge",
            "status": "SUCCESS",
            "params": {"DEPLOYMENT_ID": 42, "JOB_ID": null}
        }));
        assert_eq!(p.param(PARAM_DEPLOYMENT_ID).as_deref(), Some("42"));
        assert_eq!(p.param(PARAM_JOB_ID), None);
    }
}
