use chalops_core::error::CoreError;

/// Failure of a store operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A compare-and-swap write found a different version than expected.
    #[error("Deployment {id} was modified concurrently (expected version {expected})")]
    VersionConflict { id: String, expected: i64 },

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// A stored row could not be mapped back to the domain model.
    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

/// Map a failed insert to [`StoreError::Duplicate`] when it hit a unique key.
pub(crate) fn classify_insert(err: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::Duplicate(what())
        }
        _ => StoreError::Database(err),
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => CoreError::NotFound { entity, id },
            StoreError::VersionConflict { .. } => CoreError::Conflict(err.to_string()),
            other => CoreError::Persistence(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn not_found_stays_not_found() {
        let err: CoreError = StoreError::not_found("Deployment", "d1").into();
        assert_matches!(err, CoreError::NotFound { entity: "Deployment", ref id } if id == "d1");
    }

    #[test]
    fn version_conflict_becomes_conflict() {
        let err: CoreError = StoreError::VersionConflict {
            id: "d1".into(),
            expected: 3,
        }
        .into();
        assert_matches!(err, CoreError::Conflict(_));
    }

    #[test]
    fn other_failures_become_persistence() {
        let err: CoreError = StoreError::LockPoisoned.into();
        assert_matches!(err, CoreError::Persistence(_));
        let err: CoreError = StoreError::Database(sqlx::Error::PoolTimedOut).into();
        assert_matches!(err, CoreError::Persistence(_));
    }
}
