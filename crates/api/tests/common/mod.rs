#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use chalops_api::auth::jwt::{sign_token, Claims, JwtConfig};
use chalops_api::config::ServerConfig;
use chalops_api::router::build_app_router;
use chalops_api::state::AppState;
use chalops_core::ports::{
    DispatchError, ValidationRequest, ValidationRun, ValidationRunner,
};
use chalops_core::validation::ValidationDraft;
use chalops_db::{ChallengeStore, MemoryStore};
use chalops_engine::{
    DeploymentOrchestrator, DirectDeployer, JobLedger, JobPool, LifecycleService, LocalProvider,
    Reconciler,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const EXPECTED_FLAG: &str = "FLAG{api}";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
            audience: None,
        },
        webhook_secret: None,
        enable_docs: false,
        docs_path: "documentation/openapi.json".to_string(),
    }
}

/// Passes when the submitted flag equals [`EXPECTED_FLAG`].
pub struct FlagValidator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ValidationRunner for FlagValidator {
    async fn run(&self, request: ValidationRequest<'_>) -> Result<ValidationRun, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ok = request.flag == Some(EXPECTED_FLAG);
        Ok(ValidationRun::Completed(vec![ValidationDraft {
            step: 1,
            name: "flag".into(),
            ok,
            message: if ok { "correct" } else { "incorrect" }.into(),
            output: String::new(),
        }]))
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub provider: Arc<LocalProvider>,
    pub pool: Arc<JobPool>,
}

/// Full router over an in-memory store and the local provider.
pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config())
}

pub fn build_test_app_with(config: ServerConfig) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let store_dyn: Arc<dyn ChallengeStore> = store.clone();
    let provider = Arc::new(LocalProvider::new());
    let orchestrator = Arc::new(DeploymentOrchestrator::new(
        store_dyn.clone(),
        Arc::new(DirectDeployer::new(provider.clone())),
        Arc::new(FlagValidator {
            calls: AtomicUsize::new(0),
        }),
        "challenges",
    ));
    let pool = Arc::new(JobPool::start(2, 8));
    let service = Arc::new(LifecycleService::new(
        orchestrator,
        pool.clone(),
        Arc::new(JobLedger::new(64)),
    ));

    let state = AppState {
        service,
        reconciler: Arc::new(Reconciler::new(store_dyn.clone())),
        store: store_dyn,
        config: Arc::new(config.clone()),
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        provider,
        pool,
    }
}

/// Bearer token for `user_id`, valid for five minutes.
pub fn token_for(user_id: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: chrono::Utc::now().timestamp() + 300,
        role: Some("authenticated".into()),
    };
    let config = JwtConfig {
        secret: JWT_SECRET.to_string(),
        audience: None,
    };
    sign_token(&claims, &config).unwrap()
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("authorization", format!("Bearer {}", token_for(user)));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn get(app: &Router, uri: &str, user: Option<&str>) -> Response<Body> {
    send(app, Method::GET, uri, user, None).await
}

pub async fn post_json(app: &Router, uri: &str, user: Option<&str>, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, user, Some(body)).await
}

pub async fn delete(app: &Router, uri: &str, user: Option<&str>) -> Response<Body> {
    send(app, Method::DELETE, uri, user, None).await
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `/jobs/{id}` until the job leaves `pending`; returns the record.
pub async fn settle_job(app: &Router, user: &str, job_id: &str) -> Value {
    for _ in 0..100 {
        let response = get(app, &format!("/jobs/{job_id}"), Some(user)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        if json["status"] != "pending" {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not settle");
}

/// Deploy `challenge_id` for `user` and wait for it; returns the
/// deployment id.
pub async fn deploy_and_wait(app: &Router, user: &str, challenge_id: &str) -> String {
    let response = post_json(
        app,
        "/challenges/deploy",
        Some(user),
        serde_json::json!({ "challengeId": challenge_id }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted = body_json(response).await;
    let job_id = accepted["jobId"].as_str().unwrap().to_string();
    let job = settle_job(app, user, &job_id).await;
    assert_eq!(job["status"], "succeeded");
    accepted["deploymentId"].as_str().unwrap().to_string()
}
