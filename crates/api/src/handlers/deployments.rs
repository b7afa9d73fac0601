//! Handlers for `/challenges/deployment/{id}`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chalops_core::deployment::DeploymentStatus;
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub deployment_id: String,
    pub status: DeploymentStatus,
}

/// GET /challenges/deployment/{id}/status
///
/// Returns the live status when the provisioner reports a legal change,
/// otherwise the persisted one.
pub async fn get_status(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(deployment_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let deployment = state.service.status(&auth.user_id, &deployment_id).await?;
    Ok(Json(StatusResponse {
        deployment_id: deployment.id,
        status: deployment.status,
    }))
}

/// GET /challenges/deployment/{id}/results
pub async fn get_results(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(deployment_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let results = state.service.results(&auth.user_id, &deployment_id).await?;
    Ok(Json(results))
}

/// DELETE /challenges/deployment/{id}
///
/// Destroys inline. Deleting an already destroyed deployment is a no-op
/// and still returns 204; a `pending` one is rejected with 409.
pub async fn delete_deployment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(deployment_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let outcome = state
        .service
        .destroy_now(&auth.user_id, &deployment_id)
        .await?;
    tracing::info!(
        %deployment_id,
        status = %outcome.deployment().status,
        "Deployment deleted",
    );
    Ok(StatusCode::NO_CONTENT)
}
