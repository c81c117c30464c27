use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use serde_json::{Value, json};
use tower::ServiceExt;

use super::{ApiState, build_api_router};
use crate::application::error::ErrorReport;
use crate::application::operators::OperatorService;
use crate::application::testing::{Harness, MemoryStore};
use crate::domain::types::OperatorRole;
use crate::infra::http::rate_limit::RateLimiter;

struct TestApi {
    router: Router,
    store: Arc<MemoryStore>,
    owner: String,
    stranger: String,
}

async fn test_api(max_requests: u32) -> TestApi {
    let harness = Harness::new();
    let operators = OperatorService::new(harness.store.clone());
    let owner = operators
        .issue("owner@example.com", OperatorRole::User)
        .await
        .expect("issue owner");
    let stranger = operators
        .issue("stranger@example.com", OperatorRole::User)
        .await
        .expect("issue stranger");

    let state = ApiState {
        operators: Arc::new(operators),
        applications: Arc::new(harness.applications.clone()),
        flags: Arc::new(harness.flags.clone()),
        tags: Arc::new(harness.tags.clone()),
        bulk_tags: Arc::new(harness.bulk.clone()),
        rate_limiter: Arc::new(RateLimiter::new(Duration::from_secs(60), max_requests)),
    };

    TestApi {
        router: build_api_router(state),
        store: harness.store,
        owner: owner.token,
        stranger: stranger.token,
    }
}

async fn send(
    api: &TestApi,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request should build");

    api.router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read");
    serde_json::from_slice(&bytes).expect("body should be json")
}

async fn create_application(api: &TestApi, name: &str) -> Value {
    let response = send(
        api,
        Method::POST,
        "/api/v1/applications",
        Some(&api.owner),
        Some(json!({ "name": name })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

async fn create_flag(api: &TestApi, app_id: &str, body: Value) -> Response {
    send(
        api,
        Method::POST,
        &format!("/api/v1/applications/{app_id}/flags"),
        Some(&api.owner),
        Some(body),
    )
    .await
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthorized() {
    let api = test_api(100).await;

    let missing = send(&api, Method::GET, "/api/v1/applications", None, None).await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(missing).await["error"]["code"], "unauthorized");

    let bad = send(
        &api,
        Method::GET,
        "/api/v1/applications",
        Some("fc_nope_0123456789abcdef0123456789abcdef"),
        None,
    )
    .await;
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn storage_outage_during_auth_is_a_server_error() {
    let api = test_api(100).await;
    api.store.fail_reads(true);

    let response = send(
        &api,
        Method::GET,
        "/api/v1/applications",
        Some(&api.owner),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.extensions().get::<ErrorReport>().is_some());
    assert_eq!(json_body(response).await["error"]["code"], "db_timeout");
}

#[tokio::test]
async fn created_application_is_listed_with_flag_count() {
    let api = test_api(100).await;
    let app = create_application(&api, "web").await;
    let app_id = app["id"].as_str().unwrap();
    assert!(app["accessKey"].as_str().is_some_and(|key| !key.is_empty()));

    let flag = create_flag(
        &api,
        app_id,
        json!({ "key": "beta", "displayName": "Beta", "value": "true" }),
    )
    .await;
    assert_eq!(flag.status(), StatusCode::CREATED);

    let listed = send(
        &api,
        Method::GET,
        "/api/v1/applications",
        Some(&api.owner),
        None,
    )
    .await;
    assert_eq!(listed.status(), StatusCode::OK);
    let listed = json_body(listed).await;
    assert_eq!(listed[0]["id"], app["id"]);
    assert_eq!(listed[0]["flagCount"], 1);
}

#[tokio::test]
async fn strangers_read_not_found_and_write_forbidden() {
    let api = test_api(100).await;
    let app = create_application(&api, "web").await;
    let app_id = app["id"].as_str().unwrap();
    let flag = json_body(
        create_flag(
            &api,
            app_id,
            json!({ "key": "beta", "displayName": "Beta", "value": "true" }),
        )
        .await,
    )
    .await;
    let flag_id = flag["id"].as_str().unwrap();

    let read = send(
        &api,
        Method::GET,
        &format!("/api/v1/applications/{app_id}"),
        Some(&api.stranger),
        None,
    )
    .await;
    assert_eq!(read.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(read).await["error"]["code"], "not_found");

    let write = send(
        &api,
        Method::PATCH,
        &format!("/api/v1/applications/{app_id}/flags/{flag_id}"),
        Some(&api.stranger),
        Some(json!({ "enabled": true })),
    )
    .await;
    assert_eq!(write.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(write).await["error"]["code"], "forbidden");
}

#[tokio::test]
async fn duplicate_flag_key_conflicts() {
    let api = test_api(100).await;
    let app = create_application(&api, "web").await;
    let app_id = app["id"].as_str().unwrap();
    let body = json!({ "key": "beta", "displayName": "Beta", "value": "true" });

    assert_eq!(
        create_flag(&api, app_id, body.clone()).await.status(),
        StatusCode::CREATED
    );
    let again = create_flag(&api, app_id, body).await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(again).await["error"]["code"], "duplicate");
}

#[tokio::test]
async fn invalid_json_value_is_rejected() {
    let api = test_api(100).await;
    let app = create_application(&api, "web").await;
    let app_id = app["id"].as_str().unwrap();

    let response = create_flag(
        &api,
        app_id,
        json!({ "key": "theme", "displayName": "Theme", "type": "JSON", "value": "{not json" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "invalid_input");
}

#[tokio::test]
async fn body_shape_errors_use_the_error_envelope() {
    let api = test_api(100).await;
    let app = create_application(&api, "web").await;
    let app_id = app["id"].as_str().unwrap();

    let missing_value = create_flag(
        &api,
        app_id,
        json!({ "key": "beta", "displayName": "Beta" }),
    )
    .await;
    assert_eq!(missing_value.status(), StatusCode::BAD_REQUEST);
    let body = json_body(missing_value).await;
    assert_eq!(body["error"]["code"], "invalid_input");
    assert!(body["error"]["hint"].as_str().unwrap().contains("value"));

    let unknown_action = send(
        &api,
        Method::POST,
        &format!("/api/v1/applications/{app_id}/flags/bulk-tags"),
        Some(&api.owner),
        Some(json!({ "flagIds": [], "tagIds": [], "action": "toggle" })),
    )
    .await;
    assert_eq!(unknown_action.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(unknown_action).await["error"]["code"], "invalid_input");

    let bad_id = send(
        &api,
        Method::GET,
        "/api/v1/applications/not-a-uuid",
        Some(&api.owner),
        None,
    )
    .await;
    assert_eq!(bad_id.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(bad_id).await["error"]["code"], "bad_request");
}

#[tokio::test]
async fn bulk_tagging_returns_updated_flags() {
    let api = test_api(100).await;
    let app = create_application(&api, "web").await;
    let app_id = app["id"].as_str().unwrap();
    let flag = json_body(
        create_flag(
            &api,
            app_id,
            json!({ "key": "beta", "displayName": "Beta", "value": "true" }),
        )
        .await,
    )
    .await;
    let tag = send(
        &api,
        Method::POST,
        &format!("/api/v1/applications/{app_id}/tags"),
        Some(&api.owner),
        Some(json!({ "name": "release" })),
    )
    .await;
    assert_eq!(tag.status(), StatusCode::CREATED);
    let tag = json_body(tag).await;
    assert_eq!(tag["color"], "#6366f1");

    let response = send(
        &api,
        Method::POST,
        &format!("/api/v1/applications/{app_id}/flags/bulk-tags"),
        Some(&api.owner),
        Some(json!({ "flagIds": [flag["id"]], "tagIds": [tag["id"]], "action": "add" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["updated"], 1);
    let updated = &body["flags"][0];
    assert_eq!(updated["id"], flag["id"]);
    assert_eq!(updated["displayName"], "Beta");
    assert_eq!(updated["type"], "BOOLEAN");
    assert_eq!(updated["tags"][0]["name"], "release");
}

#[tokio::test]
async fn deleting_a_flag_answers_no_content() {
    let api = test_api(100).await;
    let app = create_application(&api, "web").await;
    let app_id = app["id"].as_str().unwrap();
    let flag = json_body(
        create_flag(
            &api,
            app_id,
            json!({ "key": "beta", "displayName": "Beta", "value": "true" }),
        )
        .await,
    )
    .await;
    let uri = format!(
        "/api/v1/applications/{app_id}/flags/{}",
        flag["id"].as_str().unwrap()
    );

    let deleted = send(&api, Method::DELETE, &uri, Some(&api.owner), None).await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let again = send(&api, Method::DELETE, &uri, Some(&api.owner), None).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn operators_are_limited_individually() {
    let api = test_api(1).await;

    let first = send(
        &api,
        Method::GET,
        "/api/v1/applications",
        Some(&api.owner),
        None,
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-ratelimit-remaining"], "0");

    let second = send(
        &api,
        Method::GET,
        "/api/v1/applications",
        Some(&api.owner),
        None,
    )
    .await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key(header::RETRY_AFTER));

    let other = send(
        &api,
        Method::GET,
        "/api/v1/applications",
        Some(&api.stranger),
        None,
    )
    .await;
    assert_eq!(other.status(), StatusCode::OK);
}
