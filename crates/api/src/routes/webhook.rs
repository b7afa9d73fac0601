use axum::routing::post;
use axum::Router;

use crate::handlers::webhook;
use crate::state::AppState;

/// Routes mounted at `/jenkins`. Authenticated by the optional shared
/// secret, not by bearer token.
pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(webhook::receive))
}
