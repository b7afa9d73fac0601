use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// GET /jobs/{jobId}
///
/// Callers only see their own jobs; another user's job is reported as
/// not found.
pub async fn get_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let record = state.service.job(&auth.user_id, &job_id)?;
    Ok(Json(record))
}
