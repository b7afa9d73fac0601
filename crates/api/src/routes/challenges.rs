//! Route definitions for the `/challenges` resource.
//!
//! All endpoints require authentication.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::{challenges, deployments};
use crate::state::AppState;

/// Routes mounted at `/challenges`.
///
/// ```text
/// POST   /deploy                    -> deploy
/// POST   /{id}/destroy              -> destroy
/// POST   /{id}/validate             -> validate
/// DELETE /deployment/{id}           -> delete_deployment
/// GET    /deployment/{id}/status    -> get_status
/// GET    /deployment/{id}/results   -> get_results
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/deploy", post(challenges::deploy))
        .route("/{id}/destroy", post(challenges::destroy))
        .route("/{id}/validate", post(challenges::validate))
        .route("/deployment/{id}", delete(deployments::delete_deployment))
        .route("/deployment/{id}/status", get(deployments::get_status))
        .route("/deployment/{id}/results", get(deployments::get_results))
}
