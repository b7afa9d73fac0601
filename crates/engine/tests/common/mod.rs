#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chalops_core::deployment::{Deployment, DeploymentStatus};
use chalops_core::pipeline::JobParameters;
use chalops_core::ports::{
    ChallengeDeployer, DeployRequest, DispatchError, ExternalJobState, JobDispatcher, JobHandle,
    Provisioned, ValidationRequest, ValidationRun, ValidationRunner,
};
use chalops_core::validation::ValidationDraft;
use chalops_db::{ChallengeStore, MemoryStore};
use chalops_engine::{DeploymentOrchestrator, Reconciler};

// ---------------------------------------------------------------------------
// Deployer
// ---------------------------------------------------------------------------

/// Deployer returning scripted results and counting calls.
pub struct FakeDeployer {
    pub initial_status: DeploymentStatus,
    pub instance_ids: Vec<String>,
    pub deploy_calls: AtomicUsize,
    pub destroy_calls: AtomicUsize,
    pub fail_deploy: AtomicBool,
    pub fail_destroy: AtomicBool,
    /// `None` makes the status query fail.
    pub live_status: Mutex<Option<DeploymentStatus>>,
}

impl FakeDeployer {
    pub fn running(instances: &[&str]) -> Self {
        Self {
            initial_status: DeploymentStatus::Running,
            instance_ids: instances.iter().map(|s| s.to_string()).collect(),
            deploy_calls: AtomicUsize::new(0),
            destroy_calls: AtomicUsize::new(0),
            fail_deploy: AtomicBool::new(false),
            fail_destroy: AtomicBool::new(false),
            live_status: Mutex::new(Some(DeploymentStatus::Running)),
        }
    }

    pub fn set_live(&self, status: Option<DeploymentStatus>) {
        *self.live_status.lock().unwrap() = status;
    }

    pub fn destroys(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChallengeDeployer for FakeDeployer {
    async fn deploy(&self, _request: DeployRequest<'_>) -> Result<Provisioned, DispatchError> {
        self.deploy_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deploy.load(Ordering::SeqCst) {
            return Err(DispatchError::Provisioning("no capacity".into()));
        }
        Ok(Provisioned {
            status: self.initial_status,
            instance_ids: self.instance_ids.clone(),
            job_handle: None,
        })
    }

    async fn destroy(
        &self,
        _deployment: &Deployment,
        _job_id: &str,
    ) -> Result<Option<JobHandle>, DispatchError> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(DispatchError::Transport("connection refused".into()));
        }
        Ok(None)
    }

    async fn status(&self, _deployment: &Deployment) -> Result<DeploymentStatus, DispatchError> {
        let live = *self.live_status.lock().unwrap();
        live.ok_or_else(|| DispatchError::Transport("status endpoint unreachable".into()))
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Dispatcher that accepts every trigger and hands out `{pipeline}#{n}`.
#[derive(Default)]
pub struct FakeDispatcher {
    pub triggered: Mutex<Vec<(String, JobParameters)>>,
    pub states: Mutex<std::collections::HashMap<String, ExternalJobState>>,
    pub reject: AtomicBool,
}

impl FakeDispatcher {
    pub fn triggered(&self) -> Vec<(String, JobParameters)> {
        self.triggered.lock().unwrap().clone()
    }

    pub fn set_state(&self, handle: &str, state: ExternalJobState) {
        self.states.lock().unwrap().insert(handle.to_string(), state);
    }
}

#[async_trait]
impl JobDispatcher for FakeDispatcher {
    async fn trigger_pipeline(
        &self,
        pipeline: &str,
        params: &JobParameters,
    ) -> Result<JobHandle, DispatchError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(DispatchError::Rejected {
                status: 403,
                body: "forbidden".into(),
            });
        }
        let mut triggered = self.triggered.lock().unwrap();
        triggered.push((pipeline.to_string(), params.clone()));
        Ok(JobHandle::new(format!("{pipeline}#{}", 100 + triggered.len())))
    }

    async fn job_state(&self, handle: &JobHandle) -> Result<ExternalJobState, DispatchError> {
        self.states
            .lock()
            .unwrap()
            .get(handle.as_str())
            .copied()
            .ok_or_else(|| DispatchError::UnknownJob(handle.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Passes when the flag equals `expected`.
pub struct FlagValidator {
    pub expected: String,
    pub calls: AtomicUsize,
}

impl FlagValidator {
    pub fn new(expected: &str) -> Self {
        Self {
            expected: expected.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ValidationRunner for FlagValidator {
    async fn run(&self, request: ValidationRequest<'_>) -> Result<ValidationRun, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ok = request.flag == Some(self.expected.as_str());
        Ok(ValidationRun::Completed(vec![ValidationDraft {
            step: 1,
            name: "flag".into(),
            ok,
            message: if ok { "correct" } else { "incorrect" }.into(),
            output: request.flag.unwrap_or_default().to_string(),
        }]))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub deployer: Arc<FakeDeployer>,
    pub validator: Arc<FlagValidator>,
    pub orchestrator: Arc<DeploymentOrchestrator>,
    pub reconciler: Arc<Reconciler>,
}

/// Orchestrator over an in-memory store, a direct-style fake deployer that
/// provisions `["i-1"]`, and a validator expecting `FLAG{x}`.
pub fn harness() -> Harness {
    harness_with(FakeDeployer::running(&["i-1"]))
}

pub fn harness_with(deployer: FakeDeployer) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let deployer = Arc::new(deployer);
    let validator = Arc::new(FlagValidator::new("FLAG{x}"));
    let store_dyn: Arc<dyn ChallengeStore> = store.clone();
    let orchestrator = Arc::new(DeploymentOrchestrator::new(
        store_dyn.clone(),
        deployer.clone(),
        validator.clone(),
        "challenges",
    ));
    let reconciler = Arc::new(Reconciler::new(store_dyn));
    Harness {
        store,
        deployer,
        validator,
        orchestrator,
        reconciler,
    }
}
