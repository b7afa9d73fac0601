//! Lifecycle endpoints: deploy, destroy, validate, status, results, jobs.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chalops_core::deployment::{Deployment, DeploymentStatus};
use chalops_db::ChallengeStore;
use common::{
    body_json, build_test_app, delete, deploy_and_wait, get, post_json, settle_job,
    EXPECTED_FLAG,
};
use serde_json::json;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = build_test_app();
    let response = post_json(
        &app.router,
        "/challenges/deploy",
        None,
        json!({ "challengeId": "c1" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn malformed_token_is_unauthorized() {
    let app = build_test_app();
    let request = Request::builder()
        .uri("/challenges/deployment/d1/status")
        .header("authorization", "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Deploy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deploy_is_accepted_and_becomes_running() {
    let app = build_test_app();
    let response = post_json(
        &app.router,
        "/challenges/deploy",
        Some("u1"),
        json!({ "challengeId": "c1" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted = body_json(response).await;
    assert_eq!(accepted["status"], "pending");
    assert!(accepted["jobId"].is_string());

    let job_id = accepted["jobId"].as_str().unwrap();
    let job = settle_job(&app.router, "u1", job_id).await;
    assert_eq!(job["status"], "succeeded");
    assert_eq!(job["kind"], "deploy");

    let deployment_id = accepted["deploymentId"].as_str().unwrap();
    let response = get(
        &app.router,
        &format!("/challenges/deployment/{deployment_id}/status"),
        Some("u1"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await;
    assert_eq!(status["deploymentId"], deployment_id);
    assert_eq!(status["status"], "running");
    assert_eq!(app.provider.running_count(), 1);
}

#[tokio::test]
async fn deploy_rejects_bad_bodies() {
    let app = build_test_app();

    let response = post_json(&app.router, "/challenges/deploy", Some("u1"), json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(
        &app.router,
        "/challenges/deploy",
        Some("u1"),
        json!({ "challengeId": "" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(
        &app.router,
        "/challenges/deploy",
        Some("u1"),
        json!({ "challengeId": "../etc" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn deploy_body_cannot_reshape_a_shared_challenge() {
    let app = build_test_app();
    deploy_and_wait(&app.router, "u1", "c1").await;
    let before = app.store.get_challenge("c1").await.unwrap();

    let response = post_json(
        &app.router,
        "/challenges/deploy",
        Some("u2"),
        json!({ "challengeId": "c1", "manifest": "/tmp/attacker.yaml", "name": "pwned" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let job_id = body_json(response).await["jobId"].as_str().unwrap().to_string();
    settle_job(&app.router, "u2", &job_id).await;

    let after = app.store.get_challenge("c1").await.unwrap();
    assert_eq!(after.manifest, before.manifest);
    assert_eq!(after.name, "c1");
}

// ---------------------------------------------------------------------------
// Status and ownership
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_deployment_is_not_found() {
    let app = build_test_app();
    let response = get(&app.router, "/challenges/deployment/nope/status", Some("u1")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn deployments_and_jobs_are_private_to_their_owner() {
    let app = build_test_app();
    let id = deploy_and_wait(&app.router, "u1", "c1").await;

    let response = get(
        &app.router,
        &format!("/challenges/deployment/{id}/status"),
        Some("u2"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = post_json(
        &app.router,
        &format!("/challenges/{id}/destroy"),
        Some("u2"),
        json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.provider.running_count(), 1);
}

// ---------------------------------------------------------------------------
// Validate and results
// ---------------------------------------------------------------------------

#[tokio::test]
async fn results_are_pending_until_validated() {
    let app = build_test_app();
    let id = deploy_and_wait(&app.router, "u1", "c1").await;
    let results_uri = format!("/challenges/deployment/{id}/results");

    let json = body_json(get(&app.router, &results_uri, Some("u1")).await).await;
    assert_eq!(json["status"], "pending");
    assert_eq!(json["results"].as_array().unwrap().len(), 0);

    let response = post_json(
        &app.router,
        &format!("/challenges/{id}/validate"),
        Some("u1"),
        json!({ "flag": EXPECTED_FLAG }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let job_id = body_json(response).await["jobId"].as_str().unwrap().to_string();
    assert_eq!(settle_job(&app.router, "u1", &job_id).await["status"], "succeeded");

    let json = body_json(get(&app.router, &results_uri, Some("u1")).await).await;
    assert_eq!(json["deploymentId"], id.as_str());
    assert_eq!(json["status"], "finished");
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["ok"], true);
    assert_eq!(results[0]["jobId"], job_id.as_str());
}

#[tokio::test]
async fn empty_flag_is_bad_request() {
    let app = build_test_app();
    let id = deploy_and_wait(&app.router, "u1", "c1").await;
    let response = post_json(
        &app.router,
        &format!("/challenges/{id}/validate"),
        Some("u1"),
        json!({ "flag": "" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Destroy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn destroy_intent_tears_down_and_blocks_validation() {
    let app = build_test_app();
    let id = deploy_and_wait(&app.router, "u1", "c1").await;

    let response = post_json(
        &app.router,
        &format!("/challenges/{id}/destroy"),
        Some("u1"),
        json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let job_id = body_json(response).await["jobId"].as_str().unwrap().to_string();
    assert_eq!(settle_job(&app.router, "u1", &job_id).await["status"], "succeeded");

    let status = body_json(
        get(
            &app.router,
            &format!("/challenges/deployment/{id}/status"),
            Some("u1"),
        )
        .await,
    )
    .await;
    assert_eq!(status["status"], "destroyed");
    assert_eq!(app.provider.running_count(), 0);

    let response = post_json(
        &app.router,
        &format!("/challenges/{id}/validate"),
        Some("u1"),
        json!({ "flag": EXPECTED_FLAG }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let app = build_test_app();
    let id = deploy_and_wait(&app.router, "u1", "c1").await;
    let uri = format!("/challenges/deployment/{id}");

    let first = delete(&app.router, &uri, Some("u1")).await;
    assert_eq!(first.status(), StatusCode::NO_CONTENT);
    let second = delete(&app.router, &uri, Some("u1")).await;
    assert_eq!(second.status(), StatusCode::NO_CONTENT);

    let status = body_json(
        get(&app.router, &format!("{uri}/status"), Some("u1")).await,
    )
    .await;
    assert_eq!(status["status"], "destroyed");
}

#[tokio::test]
async fn delete_of_pending_deployment_is_conflict() {
    let app = build_test_app();
    let pending = Deployment::new("d-pending", "c1", "u1", DeploymentStatus::Pending);
    app.store.save_deployment(&pending).await.unwrap();

    let response = delete(&app.router, "/challenges/deployment/d-pending", Some("u1")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "CONFLICT");
    assert_eq!(
        app.store.get_deployment("d-pending").await.unwrap().status,
        DeploymentStatus::Pending
    );

    let document: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../documentation/openapi.json"
        ))
        .unwrap(),
    )
    .unwrap();
    assert!(document["paths"]["/challenges/deployment/{id}"]["delete"]["responses"]["409"].is_object());
}

#[tokio::test]
async fn delete_of_unknown_deployment_is_not_found() {
    let app = build_test_app();
    let response = delete(&app.router, "/challenges/deployment/ghost", Some("u1")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_is_not_found() {
    let app = build_test_app();
    let response = get(&app.router, "/jobs/missing", Some("u1")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn another_users_job_is_not_found() {
    let app = build_test_app();
    let response = post_json(
        &app.router,
        "/challenges/deploy",
        Some("u1"),
        json!({ "challengeId": "c1" }),
    )
    .await;
    let job_id = body_json(response).await["jobId"].as_str().unwrap().to_string();

    let response = get(&app.router, &format!("/jobs/{job_id}"), Some("u2")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
