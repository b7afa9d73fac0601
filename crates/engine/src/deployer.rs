//! The two ways of provisioning a challenge.
//!
//! [`PipelineDeployer`] hands the work to the external executor and reports
//! `pending`; the outcome arrives later through reconciliation.
//! [`DirectDeployer`] provisions inline through an [`InfraProvider`] and
//! reports `running` with the created instances.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chalops_core::challenge::Challenge;
use chalops_core::deployment::{Deployment, DeploymentStatus};
use chalops_core::pipeline::{
    JobParameters, PARAM_CHALLENGE_ID, PARAM_DEPLOYMENT_ID, PARAM_INSTANCE_IDS, PARAM_MANIFEST,
    PIPELINE_DEPLOY, PIPELINE_DESTROY,
};
use chalops_core::ports::{
    ChallengeDeployer, DeployRequest, DispatchError, InfraProvider, InstanceState, JobDispatcher,
    JobHandle, Provisioned,
};

// ---------------------------------------------------------------------------
// Pipeline-backed
// ---------------------------------------------------------------------------

pub struct PipelineDeployer {
    dispatcher: Arc<dyn JobDispatcher>,
}

impl PipelineDeployer {
    pub fn new(dispatcher: Arc<dyn JobDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl ChallengeDeployer for PipelineDeployer {
    async fn deploy(&self, request: DeployRequest<'_>) -> Result<Provisioned, DispatchError> {
        let params = JobParameters::new(request.user_id, request.job_id)
            .with(PARAM_CHALLENGE_ID, request.challenge.id.as_str())
            .with(PARAM_DEPLOYMENT_ID, request.deployment_id)
            .with(PARAM_MANIFEST, request.challenge.manifest.as_str());

        let handle = self.dispatcher.trigger_pipeline(PIPELINE_DEPLOY, &params).await?;
        tracing::info!(
            deployment_id = %request.deployment_id,
            job_handle = %handle,
            "Deploy pipeline accepted",
        );

        Ok(Provisioned {
            status: DeploymentStatus::Pending,
            instance_ids: Vec::new(),
            job_handle: Some(handle),
        })
    }

    async fn destroy(
        &self,
        deployment: &Deployment,
        job_id: &str,
    ) -> Result<Option<JobHandle>, DispatchError> {
        let params = JobParameters::new(&deployment.user_id, job_id)
            .with(PARAM_CHALLENGE_ID, deployment.challenge_id.as_str())
            .with(PARAM_DEPLOYMENT_ID, deployment.id.as_str())
            .with(PARAM_INSTANCE_IDS, deployment.instance_ids.join(","));

        let handle = self.dispatcher.trigger_pipeline(PIPELINE_DESTROY, &params).await?;
        Ok(Some(handle))
    }

    /// The first recorded handle is the provisioning job; its state decides
    /// the deployment's live status.
    async fn status(&self, deployment: &Deployment) -> Result<DeploymentStatus, DispatchError> {
        let Some(handle) = deployment.job_handles.first() else {
            return Ok(deployment.status);
        };
        let state = self.dispatcher.job_state(&JobHandle::new(handle.as_str())).await?;
        Ok(state.deployment_status())
    }
}

// ---------------------------------------------------------------------------
// Direct
// ---------------------------------------------------------------------------

pub struct DirectDeployer {
    provider: Arc<dyn InfraProvider>,
}

impl DirectDeployer {
    pub fn new(provider: Arc<dyn InfraProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ChallengeDeployer for DirectDeployer {
    async fn deploy(&self, request: DeployRequest<'_>) -> Result<Provisioned, DispatchError> {
        let instance_ids = self
            .provider
            .provision(request.challenge, request.user_id)
            .await?;
        if instance_ids.is_empty() {
            return Err(DispatchError::Provisioning(format!(
                "provider returned no instances for challenge {}",
                request.challenge.id
            )));
        }
        tracing::info!(
            deployment_id = %request.deployment_id,
            instances = instance_ids.len(),
            "Challenge provisioned",
        );
        Ok(Provisioned {
            status: DeploymentStatus::Running,
            instance_ids,
            job_handle: None,
        })
    }

    async fn destroy(
        &self,
        deployment: &Deployment,
        _job_id: &str,
    ) -> Result<Option<JobHandle>, DispatchError> {
        for instance_id in &deployment.instance_ids {
            self.provider.terminate(instance_id).await?;
        }
        Ok(None)
    }

    async fn status(&self, deployment: &Deployment) -> Result<DeploymentStatus, DispatchError> {
        if deployment.instance_ids.is_empty() {
            return Ok(deployment.status);
        }
        let mut states = Vec::with_capacity(deployment.instance_ids.len());
        for instance_id in &deployment.instance_ids {
            states.push(self.provider.instance_state(instance_id).await?);
        }
        Ok(aggregate_instance_states(&states))
    }
}

/// Any broken instance fails the deployment; it runs once all instances do.
fn aggregate_instance_states(states: &[InstanceState]) -> DeploymentStatus {
    if states
        .iter()
        .any(|s| matches!(s, InstanceState::Failed | InstanceState::Stopped | InstanceState::Missing))
    {
        DeploymentStatus::Failed
    } else if states.iter().all(|s| *s == InstanceState::Running) {
        DeploymentStatus::Running
    } else {
        DeploymentStatus::Pending
    }
}

// ---------------------------------------------------------------------------
// Local provider
// ---------------------------------------------------------------------------

/// Process-local provider for development and tests. Instances exist only
/// as entries in a map and are `running` as soon as they are created.
#[derive(Default)]
pub struct LocalProvider {
    next: AtomicU64,
    instances: Mutex<HashMap<String, InstanceState>>,
}

impl LocalProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the state of an instance.
    pub fn set_state(&self, instance_id: &str, state: InstanceState) {
        if let Ok(mut instances) = self.instances.lock() {
            instances.insert(instance_id.to_string(), state);
        }
    }

    pub fn running_count(&self) -> usize {
        self.instances
            .lock()
            .map(|i| i.values().filter(|s| **s == InstanceState::Running).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl InfraProvider for LocalProvider {
    async fn provision(
        &self,
        challenge: &Challenge,
        _user_id: &str,
    ) -> Result<Vec<String>, DispatchError> {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        let instance_id = format!("local-{}-{n}", challenge.id);
        self.instances
            .lock()
            .map_err(|_| DispatchError::Provisioning("provider state poisoned".into()))?
            .insert(instance_id.clone(), InstanceState::Running);
        Ok(vec![instance_id])
    }

    async fn terminate(&self, instance_id: &str) -> Result<(), DispatchError> {
        let mut instances = self
            .instances
            .lock()
            .map_err(|_| DispatchError::Provisioning("provider state poisoned".into()))?;
        if let Some(state) = instances.get_mut(instance_id) {
            *state = InstanceState::Stopped;
        }
        Ok(())
    }

    async fn instance_state(&self, instance_id: &str) -> Result<InstanceState, DispatchError> {
        Ok(self
            .instances
            .lock()
            .map_err(|_| DispatchError::Provisioning("provider state poisoned".into()))?
            .get(instance_id)
            .copied()
            .unwrap_or(InstanceState::Missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_states() {
        use InstanceState::*;
        assert_eq!(aggregate_instance_states(&[Running, Running]), DeploymentStatus::Running);
        assert_eq!(aggregate_instance_states(&[Running, Provisioning]), DeploymentStatus::Pending);
        assert_eq!(aggregate_instance_states(&[Running, Missing]), DeploymentStatus::Failed);
        assert_eq!(aggregate_instance_states(&[Provisioning, Stopped]), DeploymentStatus::Failed);
    }

    #[tokio::test]
    async fn direct_deployer_provisions_and_terminates() {
        let provider = Arc::new(LocalProvider::new());
        let deployer = DirectDeployer::new(provider.clone());
        let challenge = Challenge::new("c1", "c1", "challenges/c1/validator.yaml");

        let provisioned = deployer
            .deploy(DeployRequest {
                deployment_id: "d1",
                job_id: "j1",
                user_id: "u1",
                challenge: &challenge,
            })
            .await
            .unwrap();
        assert_eq!(provisioned.status, DeploymentStatus::Running);
        assert_eq!(provisioned.instance_ids, vec!["local-c1-1"]);
        assert!(provisioned.job_handle.is_none());

        let mut deployment = Deployment::new("d1", "c1", "u1", DeploymentStatus::Running);
        deployment.merge_instances(provisioned.instance_ids);
        assert_eq!(deployer.status(&deployment).await.unwrap(), DeploymentStatus::Running);

        assert!(deployer.destroy(&deployment, "j2").await.unwrap().is_none());
        assert_eq!(provider.running_count(), 0);
        assert_eq!(deployer.status(&deployment).await.unwrap(), DeploymentStatus::Failed);
    }

    #[tokio::test]
    async fn direct_status_without_instances_keeps_current() {
        let deployer = DirectDeployer::new(Arc::new(LocalProvider::new()));
        let deployment = Deployment::new("d1", "c1", "u1", DeploymentStatus::Pending);
        assert_eq!(deployer.status(&deployment).await.unwrap(), DeploymentStatus::Pending);
    }
}
