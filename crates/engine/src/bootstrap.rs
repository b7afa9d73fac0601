//! Process wiring shared by the API server and the worker.
//!
//! Turns an [`EngineConfig`] into a store and the provisioning and
//! validation ports. Postgres is connected, health-checked, and migrated
//! before it is handed out.

use std::sync::Arc;

use anyhow::Context;
use chalops_core::command::ShellRunner;
use chalops_core::ports::{ChallengeDeployer, JobDispatcher, ValidationRunner};
use chalops_db::{ChallengeStore, DbPool, MemoryStore, PgStore};
use chalops_jenkins::{JenkinsConfig, JenkinsDispatcher};

use crate::config::{DeployerMode, EngineConfig, StoreBackend};
use crate::deployer::{DirectDeployer, LocalProvider, PipelineDeployer};
use crate::orchestrator::DeploymentOrchestrator;
use crate::validator::{ManifestValidator, PipelineValidator};

/// The configured store. `pool` is set for the Postgres backend so other
/// Postgres-backed components (the completion queue) can share it.
pub struct StoreHandle {
    pub store: Arc<dyn ChallengeStore>,
    pub pool: Option<DbPool>,
}

/// Open the configured store.
pub async fn open_store(config: &EngineConfig) -> anyhow::Result<StoreHandle> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; state is lost on restart");
            Ok(StoreHandle {
                store: Arc::new(MemoryStore::new()),
                pool: None,
            })
        }
        StoreBackend::Postgres => {
            let database_url =
                std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

            let pool = chalops_db::create_pool(&database_url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Database connection pool created");

            chalops_db::health_check(&pool)
                .await
                .context("Database health check failed")?;

            chalops_db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database migrations applied");

            Ok(StoreHandle {
                store: Arc::new(PgStore::new(pool.clone())),
                pool: Some(pool),
            })
        }
    }
}

/// Provisioning and validation ports for the configured mode.
pub struct Ports {
    pub deployer: Arc<dyn ChallengeDeployer>,
    pub validator: Arc<dyn ValidationRunner>,
}

pub fn build_ports(config: &EngineConfig) -> anyhow::Result<Ports> {
    match config.deployer_mode {
        DeployerMode::Pipeline => {
            let jenkins = JenkinsConfig::from_env();
            if !jenkins.has_credentials() {
                tracing::warn!(url = %jenkins.base_url, "Jenkins credentials are not configured");
            }
            let dispatcher: Arc<dyn JobDispatcher> = Arc::new(
                JenkinsDispatcher::new(jenkins).context("Failed to build Jenkins client")?,
            );
            tracing::info!("Deployer mode: pipeline");
            Ok(Ports {
                deployer: Arc::new(PipelineDeployer::new(dispatcher.clone())),
                validator: Arc::new(PipelineValidator::new(dispatcher)),
            })
        }
        DeployerMode::Direct => {
            tracing::info!("Deployer mode: direct (local provider)");
            Ok(Ports {
                deployer: Arc::new(DirectDeployer::new(Arc::new(LocalProvider::new()))),
                validator: Arc::new(ManifestValidator::new(
                    Arc::new(ShellRunner),
                    config.validation_timeout,
                )),
            })
        }
    }
}

/// Store, ports, and the orchestrator over them.
pub struct Engine {
    pub store: StoreHandle,
    pub orchestrator: Arc<DeploymentOrchestrator>,
}

pub async fn build_engine(config: &EngineConfig) -> anyhow::Result<Engine> {
    let store = open_store(config).await?;
    let ports = build_ports(config)?;
    let orchestrator = Arc::new(DeploymentOrchestrator::new(
        store.store.clone(),
        ports.deployer,
        ports.validator,
        config.manifest_root.clone(),
    ));
    Ok(Engine {
        store,
        orchestrator,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn direct_mode_over_memory_store_needs_no_environment() {
        let config = EngineConfig {
            deployer_mode: DeployerMode::Direct,
            store_backend: StoreBackend::Memory,
            ..EngineConfig::default()
        };
        let engine = build_engine(&config).await.unwrap();
        assert!(engine.store.pool.is_none());
        assert!(engine.store.store.ping().await.is_ok());
    }
}
