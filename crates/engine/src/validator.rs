//! Validation runners.
//!
//! [`PipelineValidator`] dispatches `validate_challenge`; results come back
//! with the executor's callback. [`ManifestValidator`] loads the challenge's
//! validator manifest and runs each check locally.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chalops_core::command::{CommandError, CommandRunner, CommandSpec};
use chalops_core::manifest::ValidatorManifest;
use chalops_core::pipeline::{
    JobParameters, PARAM_CHALLENGE_ID, PARAM_DEPLOYMENT_ID, PARAM_FLAG, PARAM_INSTANCE_IDS,
    PARAM_MANIFEST, PIPELINE_VALIDATE,
};
use chalops_core::ports::{
    DispatchError, JobDispatcher, ValidationRequest, ValidationRun, ValidationRunner,
};
use chalops_core::validation::ValidationDraft;

/// Output recorded for a check whose command did not finish in time.
pub const TIMEOUT_OUTPUT: &str = "timeout";

pub struct PipelineValidator {
    dispatcher: Arc<dyn JobDispatcher>,
}

impl PipelineValidator {
    pub fn new(dispatcher: Arc<dyn JobDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl ValidationRunner for PipelineValidator {
    async fn run(&self, request: ValidationRequest<'_>) -> Result<ValidationRun, DispatchError> {
        let deployment = request.deployment;
        let mut params = JobParameters::new(&deployment.user_id, request.job_id)
            .with(PARAM_CHALLENGE_ID, deployment.challenge_id.as_str())
            .with(PARAM_DEPLOYMENT_ID, deployment.id.as_str())
            .with(PARAM_MANIFEST, request.manifest)
            .with(PARAM_INSTANCE_IDS, deployment.instance_ids.join(","));
        if let Some(flag) = request.flag {
            params = params.with(PARAM_FLAG, flag);
        }

        let handle = self
            .dispatcher
            .trigger_pipeline(PIPELINE_VALIDATE, &params)
            .await?;
        Ok(ValidationRun::Dispatched(handle))
    }
}

/// Runs manifest checks through a [`CommandRunner`].
///
/// Each command sees `DEPLOYMENT_ID`, `INSTANCE_ID` (first instance) and,
/// when a flag was submitted, `FLAG` in its environment. A check passes
/// when its trimmed stdout satisfies the expectation; the exit code is not
/// consulted.
pub struct ManifestValidator {
    runner: Arc<dyn CommandRunner>,
    default_timeout: Duration,
}

impl ManifestValidator {
    pub fn new(runner: Arc<dyn CommandRunner>, default_timeout: Duration) -> Self {
        Self {
            runner,
            default_timeout,
        }
    }
}

#[async_trait]
impl ValidationRunner for ManifestValidator {
    async fn run(&self, request: ValidationRequest<'_>) -> Result<ValidationRun, DispatchError> {
        let deployment = request.deployment;
        let manifest = ValidatorManifest::load(request.manifest)
            .await
            .map_err(|e| DispatchError::ValidationSetup(e.to_string()))?;

        let mut drafts = Vec::with_capacity(manifest.check_count());
        for step in &manifest.step_validator {
            for check in &step.validations {
                let expectation = check
                    .expectation()
                    .map_err(|e| DispatchError::ValidationSetup(e.to_string()))?;
                let timeout = check
                    .timeout
                    .map(Duration::from_secs)
                    .unwrap_or(self.default_timeout);

                let mut spec = CommandSpec::new(check.command.as_str(), timeout)
                    .env("DEPLOYMENT_ID", deployment.id.as_str());
                if let Some(instance_id) = deployment.instance_ids.first() {
                    spec = spec.env("INSTANCE_ID", instance_id.as_str());
                }
                if let Some(flag) = request.flag {
                    spec = spec.env("FLAG", flag);
                }

                let (ok, output) = match self.runner.run(&spec).await {
                    Ok(out) => {
                        let output = out.stdout.trim().to_string();
                        (expectation.matches(&output), output)
                    }
                    Err(CommandError::Timeout { elapsed_ms }) => {
                        tracing::warn!(
                            deployment_id = %deployment.id,
                            check = %check.name,
                            elapsed_ms,
                            "Validation command timed out",
                        );
                        (false, TIMEOUT_OUTPUT.to_string())
                    }
                    Err(e) => return Err(DispatchError::ValidationSetup(e.to_string())),
                };

                drafts.push(ValidationDraft {
                    step: step.step,
                    name: check.name.clone(),
                    ok,
                    message: check.message_for(ok).to_string(),
                    output,
                });
            }
        }

        Ok(ValidationRun::Completed(drafts))
    }
}
