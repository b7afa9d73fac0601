//! Executor callback endpoint.
//!
//! Every well-formed callback is acknowledged with `200 received`, even
//! when it names an unknown deployment or a job this service never
//! dispatched; the executor has nothing useful to do with a rejection.
//! Only malformed bodies (400) and store failures (500) are errors.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chalops_engine::{ReconcileResult, WebhookPayload};
use serde_json::json;

use crate::error::AppResult;
use crate::middleware::webhook::WebhookCaller;
use crate::state::AppState;

/// POST /jenkins/webhook
pub async fn receive(
    _caller: WebhookCaller,
    State(state): State<AppState>,
    payload: Result<Json<WebhookPayload>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(payload) = payload?;

    match state.reconciler.handle_webhook(&payload).await? {
        ReconcileResult::Applied(d) => {
            tracing::info!(deployment_id = %d.id, status = %d.status, "Callback applied");
        }
        ReconcileResult::NoOp(d) => {
            tracing::debug!(deployment_id = %d.id, status = %d.status, "Callback changed nothing");
        }
        ReconcileResult::UnknownDeployment => {
            tracing::warn!(job_name = %payload.job_name, "Callback for unknown deployment");
        }
        ReconcileResult::Ignored(_) => {}
    }

    Ok(Json(json!({ "status": "received" })))
}
