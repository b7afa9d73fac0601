use std::sync::Arc;

use chalops_db::ChallengeStore;
use chalops_engine::{LifecycleService, Reconciler};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle operations (deploy, destroy, validate, status, jobs).
    pub service: Arc<LifecycleService>,
    /// Applies executor callbacks.
    pub reconciler: Arc<Reconciler>,
    /// Store handle, used by the health check.
    pub store: Arc<dyn ChallengeStore>,
    pub config: Arc<ServerConfig>,
}
