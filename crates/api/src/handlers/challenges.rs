//! Handlers for the `/challenges` lifecycle intents.
//!
//! Each intent is checked synchronously and then queued; the response is
//! `202 Accepted` carrying the job id. Outcomes are observable through
//! `/jobs/{jobId}` and the deployment status endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chalops_core::challenge::ChallengeSpec;
use serde::Deserialize;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// Body of `POST /challenges/deploy`.
///
/// Only the challenge id is read; the definition itself is never shaped by
/// a request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeployBody {
    #[validate(length(min = 1, max = 128))]
    pub challenge_id: String,
}

/// Body of `POST /challenges/{id}/validate`.
#[derive(Debug, Deserialize, Validate)]
pub struct ValidateBody {
    #[validate(length(min = 1))]
    pub flag: String,
}

/// POST /challenges/deploy
pub async fn deploy(
    auth: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<DeployBody>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(body) = payload?;
    body.validate()?;

    let accepted = state
        .service
        .submit_deploy(&auth.user_id, ChallengeSpec::with_id(body.challenge_id))
        .await?;

    tracing::info!(
        job_id = %accepted.job_id,
        deployment_id = %accepted.deployment_id,
        user_id = %auth.user_id,
        "Deploy accepted",
    );
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// POST /challenges/{id}/destroy
///
/// `id` is the deployment id.
pub async fn destroy(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(deployment_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let accepted = state
        .service
        .submit_destroy(&auth.user_id, &deployment_id)
        .await?;

    tracing::info!(job_id = %accepted.job_id, %deployment_id, "Destroy accepted");
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// POST /challenges/{id}/validate
///
/// `id` is the deployment id.
pub async fn validate(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(deployment_id): Path<String>,
    payload: Result<Json<ValidateBody>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(body) = payload?;
    body.validate()?;

    let accepted = state
        .service
        .submit_validate(&auth.user_id, &deployment_id, &body.flag)
        .await?;

    tracing::info!(job_id = %accepted.job_id, %deployment_id, "Validation accepted");
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}
