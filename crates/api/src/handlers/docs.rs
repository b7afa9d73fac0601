use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// GET /docs
///
/// Serves the OpenAPI document from `DOCS_PATH`. Only mounted when
/// `ENABLE_DOCS` is set.
pub async fn openapi(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let body = tokio::fs::read_to_string(&state.config.docs_path)
        .await
        .map_err(|e| {
            AppError::InternalError(format!(
                "cannot read API document {}: {e}",
                state.config.docs_path
            ))
        })?;
    Ok(([(CONTENT_TYPE, "application/json")], body))
}
