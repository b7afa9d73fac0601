//! Challenge definitions: the deployable unit a user asks to materialize.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::status::define_status_enum;
use crate::types::{advance_timestamp, EntityId, Timestamp};

/// Maximum length of a challenge id.
const MAX_CHALLENGE_ID_LEN: usize = 128;

/// File name of the validator manifest inside a challenge's directory.
pub const VALIDATOR_MANIFEST_FILE: &str = "validator.yaml";

define_status_enum! {
    /// Lifecycle of a challenge definition, independent of any deployment.
    ///
    /// `Failed` records that the last provisioning attempt for this
    /// definition did not produce infrastructure.
    ChallengeStatus ("challenge") {
        Initializing = "initializing",
        InProgress = "in_progress",
        Active = "active",
        Succeeded = "succeeded",
        Failed = "failed",
    }
}

/// Whether `value` is a recognized challenge status literal.
pub fn is_valid_challenge_status(value: &str) -> bool {
    value.parse::<ChallengeStatus>().is_ok()
}

/// A deployable challenge definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    /// Opaque locator resolved by the executor (artifact path, object URI).
    pub manifest: String,
    pub status: ChallengeStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Challenge {
    /// Build a definition in the `initializing` state.
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>, manifest: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            manifest: manifest.into(),
            status: ChallengeStatus::Initializing,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the definition status and advance `updated_at`.
    pub fn set_status(&mut self, status: ChallengeStatus) {
        self.status = status;
        self.updated_at = advance_timestamp(self.updated_at);
    }
}

/// Caller-supplied description of the challenge a deploy intent refers to.
///
/// Only `id` is required. The optional fields fill in a definition the
/// first time it is referenced; a stored definition keeps its own values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSpec {
    pub id: EntityId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub manifest: Option<String>,
}

impl ChallengeSpec {
    pub fn with_id(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Reuse an existing definition, or create one from this spec.
    ///
    /// The returned definition is always in the `initializing` state: a
    /// deploy intent restarts the definition's lifecycle.
    pub fn resolve(&self, existing: Option<Challenge>, manifest_root: &str) -> Challenge {
        let mut challenge = existing.unwrap_or_else(|| self.create(manifest_root));
        challenge.set_status(ChallengeStatus::Initializing);
        challenge
    }

    fn create(&self, manifest_root: &str) -> Challenge {
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(self.id.as_str());
        let manifest = self
            .manifest
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_manifest(manifest_root, &self.id));
        let mut challenge = Challenge::new(self.id.clone(), name, manifest);
        challenge.description = self.description.clone().unwrap_or_default();
        challenge
    }
}

/// Default manifest locator for a challenge: `{root}/{id}/validator.yaml`.
pub fn default_manifest(root: &str, challenge_id: &str) -> String {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        format!("{challenge_id}/{VALIDATOR_MANIFEST_FILE}")
    } else {
        format!("{root}/{challenge_id}/{VALIDATOR_MANIFEST_FILE}")
    }
}

/// Validate a challenge id.
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed `MAX_CHALLENGE_ID_LEN` characters.
/// - Must contain only alphanumeric, hyphen, underscore, or dot characters,
///   since it is embedded in manifest paths and executor parameters.
pub fn validate_challenge_id(id: &str) -> Result<(), CoreError> {
    if id.trim().is_empty() {
        return Err(CoreError::Validation("challengeId is required".into()));
    }
    if id.len() > MAX_CHALLENGE_ID_LEN {
        return Err(CoreError::Validation(format!(
            "challengeId must not exceed {MAX_CHALLENGE_ID_LEN} characters"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(CoreError::Validation(
            "challengeId may only contain alphanumeric, hyphen, underscore, or dot characters"
                .into(),
        ));
    }
    if id.starts_with('.') {
        return Err(CoreError::Validation(
            "challengeId must not start with a dot".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn status_literals_round_trip() {
        for status in ChallengeStatus::ALL {
            assert_eq!(status.as_str().parse::<ChallengeStatus>(), Ok(*status));
        }
        assert_eq!(ChallengeStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(!is_valid_challenge_status("deployed"));
        assert!(!is_valid_challenge_status("Active"));
        assert!(is_valid_challenge_status("active"));
    }

    #[test]
    fn status_serializes_as_literal() {
        let json = serde_json::to_value(ChallengeStatus::Initializing).unwrap();
        assert_eq!(json, "initializing");
    }

    #[test]
    fn resolve_creates_definition_with_default_manifest() {
        let spec = ChallengeSpec::with_id("c1");
        let challenge = spec.resolve(None, "challenges/");
        assert_eq!(challenge.id, "c1");
        assert_eq!(challenge.name, "c1");
        assert_eq!(challenge.manifest, "challenges/c1/validator.yaml");
        assert_eq!(challenge.status, ChallengeStatus::Initializing);
    }

    #[test]
    fn resolve_keeps_stored_fields_and_resets_status() {
        let mut stored = Challenge::new("c1", "Web 101", "s3://bucket/c1.yaml");
        stored.set_status(ChallengeStatus::Failed);

        let spec = ChallengeSpec {
            id: "c1".into(),
            name: Some("pwned".into()),
            description: Some("intro".into()),
            manifest: Some("/tmp/other.yaml".into()),
        };
        let challenge = spec.resolve(Some(stored), "challenges");

        assert_eq!(challenge.name, "Web 101");
        assert_eq!(challenge.manifest, "s3://bucket/c1.yaml");
        assert_eq!(challenge.description, "");
        assert_eq!(challenge.status, ChallengeStatus::Initializing);
    }

    #[test]
    fn resolve_applies_optional_fields_on_creation() {
        let spec = ChallengeSpec {
            id: "c1".into(),
            name: Some(" Web 101 ".into()),
            description: Some("intro".into()),
            manifest: Some("s3://bucket/c1.yaml".into()),
        };
        let challenge = spec.resolve(None, "challenges");
        assert_eq!(challenge.name, "Web 101");
        assert_eq!(challenge.description, "intro");
        assert_eq!(challenge.manifest, "s3://bucket/c1.yaml");
    }

    #[test]
    fn challenge_id_validation() {
        assert!(validate_challenge_id("web-101_v2.1").is_ok());
        assert_matches!(validate_challenge_id(""), Err(CoreError::Validation(_)));
        assert_matches!(validate_challenge_id("   "), Err(CoreError::Validation(_)));
        assert_matches!(validate_challenge_id("../etc"), Err(CoreError::Validation(_)));
        assert_matches!(validate_challenge_id("a/b"), Err(CoreError::Validation(_)));
        let long = "x".repeat(MAX_CHALLENGE_ID_LEN + 1);
        assert_matches!(validate_challenge_id(&long), Err(CoreError::Validation(_)));
    }
}
