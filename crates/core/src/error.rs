/// Domain error taxonomy shared by the store, the orchestrator, and the
/// HTTP layer.
///
/// `NotFound`, `Validation`, `Unauthorized`, and `Conflict` are caller
/// errors. `Dispatch` (the executor rejected or could not be reached) and
/// `Persistence` (the store failed) are reported to callers as a generic
/// internal failure.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("External dispatch failed: {0}")]
    Dispatch(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_includes_entity_and_id() {
        let err = CoreError::not_found("Deployment", "d1");
        assert_eq!(err.to_string(), "Entity not found: Deployment with id d1");
    }

    #[test]
    fn dispatch_display() {
        let err = CoreError::Dispatch("HTTP 503".into());
        assert_eq!(err.to_string(), "External dispatch failed: HTTP 503");
    }
}
