use axum::routing::get;
use axum::Router;

use crate::handlers::docs;
use crate::state::AppState;

/// `/docs`, merged only when docs are enabled.
pub fn router() -> Router<AppState> {
    Router::new().route("/docs", get(docs::openapi))
}
