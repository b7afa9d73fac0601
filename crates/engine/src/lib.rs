//! Deployment orchestration engine.
//!
//! - [`orchestrator`] -- deploy, destroy, validate, and status operations.
//! - [`reconciler`] -- applies executor outcomes from webhooks and the
//!   completion queue.
//! - [`deployer`] / [`validator`] -- pipeline-backed and direct
//!   implementations of the provisioning and validation ports.
//! - [`service`] -- request-facing wrapper that runs lifecycle work on the
//!   bounded [`pool`] and records it in the [`ledger`].
//! - [`poller`] -- periodic status refresh.
//! - [`bootstrap`] -- store and port wiring for the binaries.

pub mod bootstrap;
pub mod config;
pub mod deployer;
pub mod ledger;
pub mod locks;
pub mod orchestrator;
pub mod poller;
pub mod pool;
pub mod reconciler;
pub mod service;
pub mod validator;

pub use config::{DeployerMode, EngineConfig, StoreBackend};
pub use deployer::{DirectDeployer, LocalProvider, PipelineDeployer};
pub use ledger::{JobLedger, JobRecord, JobStatus};
pub use orchestrator::{
    DeployIntent, DeploymentOrchestrator, DeploymentResults, DestroyOutcome, ValidationOutcome,
};
pub use poller::StatusPoller;
pub use pool::JobPool;
pub use reconciler::{CompletionReconciler, JobOutcome, ReconcileResult, Reconciler, WebhookPayload};
pub use service::{Accepted, LifecycleService};
pub use validator::{ManifestValidator, PipelineValidator};
