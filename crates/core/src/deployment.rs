//! Deployments and the status state machine.
//!
//! ```text
//! pending ──> running ──> finished ──┐
//!                 │                  ├──> destroyed
//!                 ├─────> failed ────┤
//!                 └──────────────────┘
//! ```
//!
//! `pending` is the only initial state and `destroyed` is terminal. A
//! failed deployment is never retried in place; a new deploy intent creates
//! a fresh record.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::status::define_status_enum;
use crate::types::{advance_timestamp, EntityId, Timestamp};

define_status_enum! {
    /// Lifecycle of one deployment.
    DeploymentStatus ("deployment") {
        Pending = "pending",
        Running = "running",
        Failed = "failed",
        Finished = "finished",
        Destroyed = "destroyed",
    }
}

/// Whether `value` is a recognized deployment status literal.
pub fn is_valid_deployment_status(value: &str) -> bool {
    value.parse::<DeploymentStatus>().is_ok()
}

impl DeploymentStatus {
    /// Whether `next` is a direct edge of the state machine.
    pub fn can_transition_to(self, next: DeploymentStatus) -> bool {
        use DeploymentStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Finished)
                | (Running, Failed)
                | (Running | Finished | Failed, Destroyed)
        )
    }

    /// Statuses to pass through to reach `target`, excluding `self`.
    ///
    /// Returns an empty path when already at `target`, and `None` when the
    /// target is unreachable. An outcome reported for a deployment that is
    /// still `pending` implies it ran, so `finished` and `failed` are reached
    /// through `running`.
    pub fn path_to(self, target: DeploymentStatus) -> Option<Vec<DeploymentStatus>> {
        use DeploymentStatus::*;
        if self == target {
            return Some(Vec::new());
        }
        if self.can_transition_to(target) {
            return Some(vec![target]);
        }
        if self == Pending && matches!(target, Finished | Failed) {
            return Some(vec![Running, target]);
        }
        None
    }

    /// `destroyed` admits no further transitions.
    pub fn is_terminal(self) -> bool {
        self == DeploymentStatus::Destroyed
    }

    /// Deployments whose outcome is still owed by the executor.
    pub fn is_transient(self) -> bool {
        matches!(self, DeploymentStatus::Pending | DeploymentStatus::Running)
    }
}

/// One attempt to materialize a challenge for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: EntityId,
    pub challenge_id: EntityId,
    pub user_id: String,
    /// Instance identifiers assigned by the executor once provisioned.
    pub instance_ids: Vec<String>,
    /// Every job handle dispatched on behalf of this deployment, oldest first.
    pub job_handles: Vec<String>,
    pub status: DeploymentStatus,
    /// Optimistic concurrency token, bumped by every successful update.
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Deployment {
    /// Build a new record at version 0.
    pub fn new(
        id: impl Into<EntityId>,
        challenge_id: impl Into<EntityId>,
        user_id: impl Into<String>,
        status: DeploymentStatus,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: id.into(),
            challenge_id: challenge_id.into(),
            user_id: user_id.into(),
            instance_ids: Vec::new(),
            job_handles: Vec::new(),
            status,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply one edge of the state machine.
    ///
    /// Returns `Conflict` if `next` is not a direct successor of the
    /// current status; the record is left untouched in that case.
    pub fn transition_to(&mut self, next: DeploymentStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Deployment {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Walk the shortest legal path to `target`.
    ///
    /// Returns `Ok(false)` when already at `target`.
    pub fn advance_to(&mut self, target: DeploymentStatus) -> Result<bool, CoreError> {
        let path = self.status.path_to(target).ok_or_else(|| {
            CoreError::Conflict(format!(
                "Deployment {} cannot reach {} from {}",
                self.id, target, self.status
            ))
        })?;
        for step in &path {
            self.transition_to(*step)?;
        }
        Ok(!path.is_empty())
    }

    /// Remember a dispatched job handle. Duplicate handles are ignored.
    pub fn record_job(&mut self, handle: impl Into<String>) -> bool {
        let handle = handle.into();
        if self.job_handles.contains(&handle) {
            return false;
        }
        self.job_handles.push(handle);
        self.touch();
        true
    }

    /// Add instance handles reported by the executor, keeping order and
    /// skipping ones already known.
    pub fn merge_instances<I, S>(&mut self, instance_ids: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut changed = false;
        for id in instance_ids {
            let id = id.into();
            if !id.is_empty() && !self.instance_ids.contains(&id) {
                self.instance_ids.push(id);
                changed = true;
            }
        }
        if changed {
            self.touch();
        }
        changed
    }

    fn touch(&mut self) {
        self.updated_at = advance_timestamp(self.updated_at);
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use DeploymentStatus::*;

    #[test]
    fn only_declared_edges_are_allowed() {
        let allowed = [
            (Pending, Running),
            (Running, Finished),
            (Running, Failed),
            (Running, Destroyed),
            (Finished, Destroyed),
            (Failed, Destroyed),
        ];
        for from in DeploymentStatus::ALL {
            for to in DeploymentStatus::ALL {
                assert_eq!(
                    from.can_transition_to(*to),
                    allowed.contains(&(*from, *to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn destroyed_is_terminal() {
        assert!(Destroyed.is_terminal());
        for to in DeploymentStatus::ALL {
            assert!(!Destroyed.can_transition_to(*to));
        }
    }

    #[test]
    fn unrecognized_literals_are_invalid() {
        assert!(is_valid_deployment_status("finished"));
        assert!(!is_valid_deployment_status("deployed"));
        assert!(!is_valid_deployment_status(""));
        assert!(!is_valid_deployment_status("RUNNING"));
    }

    #[test]
    fn pending_reaches_finished_through_running() {
        assert_eq!(Pending.path_to(Finished), Some(vec![Running, Finished]));
        assert_eq!(Pending.path_to(Failed), Some(vec![Running, Failed]));
        assert_eq!(Pending.path_to(Destroyed), None);
        assert_eq!(Finished.path_to(Finished), Some(vec![]));
        assert_eq!(Destroyed.path_to(Running), None);
    }

    #[test]
    fn transition_rejects_illegal_edge_without_mutation() {
        let mut d = Deployment::new("d1", "c1", "u1", Finished);
        let before = d.clone();
        assert_matches!(d.transition_to(Running), Err(CoreError::Conflict(_)));
        assert_eq!(d, before);
    }

    #[test]
    fn transition_advances_updated_at() {
        let mut d = Deployment::new("d1", "c1", "u1", Running);
        let before = d.updated_at;
        d.transition_to(Finished).unwrap();
        assert_eq!(d.status, Finished);
        assert!(d.updated_at > before);
    }

    #[test]
    fn advance_to_same_status_is_noop() {
        let mut d = Deployment::new("d1", "c1", "u1", Finished);
        assert_eq!(d.advance_to(Finished).unwrap(), false);
        assert!(d.advance_to(Pending).is_err());
    }

    #[test]
    fn record_job_and_merge_instances_dedupe() {
        let mut d = Deployment::new("d1", "c1", "u1", Pending);
        assert!(d.record_job("deploy_challenge#7"));
        assert!(!d.record_job("deploy_challenge#7"));
        assert!(d.merge_instances(["i-1", "i-2"]));
        assert!(!d.merge_instances(["i-2", ""]));
        assert_eq!(d.instance_ids, vec!["i-1", "i-2"]);
        assert_eq!(d.job_handles, vec!["deploy_challenge#7"]);
    }
}
