//! In-memory store for tests and single-process development.
//!
//! State lives behind one `RwLock`, so every operation observes a
//! consistent snapshot and the compare-and-swap in `update_deployment` is
//! atomic. Nothing survives a restart.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chalops_core::challenge::Challenge;
use chalops_core::deployment::{Deployment, DeploymentStatus};
use chalops_core::validation::ValidationResult;

use crate::error::{StoreError, StoreResult};
use crate::store::ChallengeStore;

#[derive(Debug, Default)]
struct State {
    challenges: HashMap<String, Challenge>,
    deployments: HashMap<String, Deployment>,
    /// Insertion order of deployment ids, for stable listing.
    deployment_order: Vec<String>,
    results: HashMap<String, Vec<ValidationResult>>,
    result_ids: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

fn poison_err<T>(_: PoisonError<T>) -> StoreError {
    StoreError::LockPoisoned
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored deployments.
    pub fn deployment_count(&self) -> StoreResult<usize> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.deployments.len())
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn save_challenge(&self, challenge: &Challenge) -> StoreResult<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state
            .challenges
            .insert(challenge.id.clone(), challenge.clone());
        Ok(())
    }

    async fn get_challenge(&self, id: &str) -> StoreResult<Challenge> {
        let state = self.state.read().map_err(poison_err)?;
        state
            .challenges
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Challenge", id))
    }

    async fn save_deployment(&self, deployment: &Deployment) -> StoreResult<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        if state.deployments.contains_key(&deployment.id) {
            return Err(StoreError::Duplicate(format!("deployment {}", deployment.id)));
        }
        if !state.challenges.contains_key(&deployment.challenge_id) {
            return Err(StoreError::InvalidRecord(format!(
                "deployment {} references unknown challenge {}",
                deployment.id, deployment.challenge_id
            )));
        }
        state.deployment_order.push(deployment.id.clone());
        state
            .deployments
            .insert(deployment.id.clone(), deployment.clone());
        Ok(())
    }

    async fn get_deployment(&self, id: &str) -> StoreResult<Deployment> {
        let state = self.state.read().map_err(poison_err)?;
        state
            .deployments
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Deployment", id))
    }

    async fn update_deployment(&self, deployment: &Deployment) -> StoreResult<Deployment> {
        let mut state = self.state.write().map_err(poison_err)?;
        let Some(stored) = state.deployments.get_mut(&deployment.id) else {
            return Err(StoreError::not_found("Deployment", &deployment.id));
        };
        if stored.version != deployment.version {
            return Err(StoreError::VersionConflict {
                id: deployment.id.clone(),
                expected: deployment.version,
            });
        }
        let mut next = deployment.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn find_deployment_by_job(&self, job_handle: &str) -> StoreResult<Option<Deployment>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .deployments
            .values()
            .find(|d| d.job_handles.iter().any(|h| h == job_handle))
            .cloned())
    }

    async fn list_deployments_by_status(
        &self,
        statuses: &[DeploymentStatus],
    ) -> StoreResult<Vec<Deployment>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .deployment_order
            .iter()
            .filter_map(|id| state.deployments.get(id))
            .filter(|d| statuses.contains(&d.status))
            .cloned()
            .collect())
    }

    async fn save_validation_result(&self, result: &ValidationResult) -> StoreResult<bool> {
        let mut state = self.state.write().map_err(poison_err)?;
        if !state.deployments.contains_key(&result.deployment_id) {
            return Err(StoreError::not_found("Deployment", &result.deployment_id));
        }
        if !state.result_ids.insert(result.id.clone()) {
            return Ok(false);
        }
        state
            .results
            .entry(result.deployment_id.clone())
            .or_default()
            .push(result.clone());
        Ok(true)
    }

    async fn get_validation_results(
        &self,
        deployment_id: &str,
    ) -> StoreResult<Vec<ValidationResult>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .results
            .get(deployment_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.state.read().map_err(poison_err).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chalops_core::validation::ValidationDraft;

    use super::*;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .save_challenge(&Challenge::new("c1", "Intro", "challenges/c1/validator.yaml"))
            .await
            .unwrap();
        store
            .save_deployment(&Deployment::new("d1", "c1", "u1", DeploymentStatus::Running))
            .await
            .unwrap();
        store
    }

    fn result(id: &str, deployment_id: &str) -> ValidationResult {
        ValidationDraft {
            step: 1,
            name: "flag".into(),
            ok: true,
            message: "correct".into(),
            output: String::new(),
        }
        .into_result(id, deployment_id, "j1")
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = MemoryStore::new();
        assert_matches!(
            store.get_challenge("nope").await,
            Err(StoreError::NotFound { entity: "Challenge", .. })
        );
        assert_matches!(
            store.get_deployment("nope").await,
            Err(StoreError::NotFound { entity: "Deployment", .. })
        );
    }

    #[tokio::test]
    async fn deployment_requires_existing_challenge() {
        let store = MemoryStore::new();
        let err = store
            .save_deployment(&Deployment::new("d1", "ghost", "u1", DeploymentStatus::Pending))
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::InvalidRecord(_));
    }

    #[tokio::test]
    async fn duplicate_deployment_is_rejected() {
        let store = seeded().await;
        let err = store
            .save_deployment(&Deployment::new("d1", "c1", "u2", DeploymentStatus::Pending))
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::Duplicate(_));
    }

    #[tokio::test]
    async fn update_is_compare_and_swap() {
        let store = seeded().await;
        let mut first = store.get_deployment("d1").await.unwrap();
        let mut second = first.clone();

        first.transition_to(DeploymentStatus::Finished).unwrap();
        let stored = store.update_deployment(&first).await.unwrap();
        assert_eq!(stored.version, 1);

        second.transition_to(DeploymentStatus::Failed).unwrap();
        assert_matches!(
            store.update_deployment(&second).await,
            Err(StoreError::VersionConflict { expected: 0, .. })
        );
        assert_eq!(
            store.get_deployment("d1").await.unwrap().status,
            DeploymentStatus::Finished
        );
    }

    #[tokio::test]
    async fn finds_deployment_by_job_handle() {
        let store = seeded().await;
        let mut d = store.get_deployment("d1").await.unwrap();
        d.record_job("deploy_challenge#12");
        store.update_deployment(&d).await.unwrap();

        let found = store.find_deployment_by_job("deploy_challenge#12").await.unwrap();
        assert_eq!(found.map(|d| d.id), Some("d1".to_string()));
        assert!(store.find_deployment_by_job("other#1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lists_by_status_in_insertion_order() {
        let store = seeded().await;
        store
            .save_deployment(&Deployment::new("d2", "c1", "u1", DeploymentStatus::Pending))
            .await
            .unwrap();
        store
            .save_deployment(&Deployment::new("d3", "c1", "u1", DeploymentStatus::Failed))
            .await
            .unwrap();

        let ids: Vec<_> = store
            .list_deployments_by_status(&[DeploymentStatus::Pending, DeploymentStatus::Running])
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["d1", "d2"]);
    }

    #[tokio::test]
    async fn validation_results_append_and_dedupe() {
        let store = seeded().await;
        assert!(store.save_validation_result(&result("r1", "d1")).await.unwrap());
        assert!(store.save_validation_result(&result("r2", "d1")).await.unwrap());
        assert!(!store.save_validation_result(&result("r1", "d1")).await.unwrap());

        let ids: Vec<_> = store
            .get_validation_results("d1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["r1", "r2"]);
        assert!(store.get_validation_results("d2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn validation_result_requires_deployment() {
        let store = seeded().await;
        assert_matches!(
            store.save_validation_result(&result("r1", "ghost")).await,
            Err(StoreError::NotFound { .. })
        );
    }
}
