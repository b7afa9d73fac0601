pub mod challenges;
pub mod docs;
pub mod health;
pub mod jobs;
pub mod webhook;

use axum::Router;

use crate::state::AppState;

/// Build the service route tree (mounted at the root).
///
/// ```text
/// /challenges/deploy                    deploy intent (POST, 202)
/// /challenges/{id}/destroy              destroy intent (POST, 202)
/// /challenges/{id}/validate             validate intent (POST, 202)
/// /challenges/deployment/{id}           inline destroy (DELETE, 204)
/// /challenges/deployment/{id}/status    status (GET)
/// /challenges/deployment/{id}/results   validation results (GET)
///
/// /jobs/{jobId}                         job ledger entry (GET)
///
/// /jenkins/webhook                      executor callback (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/challenges", challenges::router())
        .nest("/jobs", jobs::router())
        .nest("/jenkins", webhook::router())
}
