//! Validation results: append-only outcomes of checking a deployment.

use serde::{Deserialize, Serialize};

use crate::deployment::DeploymentStatus;
use crate::error::CoreError;
use crate::types::{EntityId, Timestamp};

/// Maximum accepted flag length.
const MAX_FLAG_LEN: usize = 512;

/// One recorded validation check. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub id: EntityId,
    pub deployment_id: EntityId,
    /// Job that produced this result; results sharing a job form one set.
    pub job_id: String,
    /// Ordinal of the validation stage within a multi-stage script.
    pub step: i32,
    pub name: String,
    pub ok: bool,
    pub message: String,
    pub output: String,
    pub created_at: Timestamp,
}

/// A result produced by a runner or a callback, before it is assigned an
/// identity and attached to a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationDraft {
    #[serde(default = "default_step")]
    pub step: i32,
    pub name: String,
    pub ok: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub output: String,
}

fn default_step() -> i32 {
    1
}

impl ValidationDraft {
    pub fn into_result(
        self,
        id: impl Into<EntityId>,
        deployment_id: impl Into<EntityId>,
        job_id: impl Into<String>,
    ) -> ValidationResult {
        ValidationResult {
            id: id.into(),
            deployment_id: deployment_id.into(),
            job_id: job_id.into(),
            step: self.step,
            name: self.name,
            ok: self.ok,
            message: self.message,
            output: self.output,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Deterministic id for the `index`-th result of a job.
///
/// Callback replays carry the same job and ordering, so they map onto the
/// ids that were already appended.
pub fn callback_result_id(job_handle: &str, step: i32, index: usize) -> EntityId {
    format!("{job_handle}:{step}:{index}")
}

/// Aggregate status reported alongside a deployment's results:
/// `pending` until at least one result exists, `finished` afterwards.
pub fn results_status(results: &[ValidationResult]) -> DeploymentStatus {
    if results.is_empty() {
        DeploymentStatus::Pending
    } else {
        DeploymentStatus::Finished
    }
}

/// Validate a submitted flag: non-empty, bounded, single line.
pub fn validate_flag(flag: &str) -> Result<(), CoreError> {
    if flag.trim().is_empty() {
        return Err(CoreError::Validation("flag is required".into()));
    }
    if flag.len() > MAX_FLAG_LEN {
        return Err(CoreError::Validation(format!(
            "flag must not exceed {MAX_FLAG_LEN} characters"
        )));
    }
    if flag.contains(['\n', '\r', '\0']) {
        return Err(CoreError::Validation(
            "flag must be a single line".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(ok: bool) -> ValidationDraft {
        ValidationDraft {
            step: 1,
            name: "flag".into(),
            ok,
            message: String::new(),
            output: String::new(),
        }
    }

    #[test]
    fn results_status_tracks_presence() {
        assert_eq!(results_status(&[]), DeploymentStatus::Pending);
        let result = draft(true).into_result("r1", "d1", "j1");
        assert_eq!(results_status(&[result]), DeploymentStatus::Finished);
    }

    #[test]
    fn draft_deserializes_with_defaults() {
        let draft: ValidationDraft =
            serde_json::from_value(serde_json::json!({"name": "port open", "ok": false})).unwrap();
        assert_eq!(draft.step, 1);
        assert!(draft.message.is_empty());
        assert!(!draft.ok);
    }

    #[test]
    fn callback_ids_are_stable() {
        assert_eq!(callback_result_id("validate_challenge#4", 2, 0), "validate_challenge#4:2:0");
    }

    #[test]
    fn flag_validation() {
        assert!(validate_flag("FLAG{x}").is_ok());
        assert!(validate_flag("").is_err());
        assert!(validate_flag("  ").is_err());
        assert!(validate_flag("a\nb").is_err());
        assert!(validate_flag(&"f".repeat(MAX_FLAG_LEN + 1)).is_err());
    }
}
