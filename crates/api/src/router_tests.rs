use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use engine::{EngineError, FlowDefinition, FlowInstance, MemoryStore, Workflow, WorkflowStore};

use crate::router;

fn app() -> Router {
    router(Arc::new(Workflow::with_store(Arc::new(MemoryStore::new()))))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register_two_step(app: &Router) {
    let (status, _) = call(
        app,
        Method::POST,
        "/api/flows",
        Some(json!({
            "code": "doc-approve",
            "name": "Document approval",
            "nodes": [
                { "id": "lead", "name": "Team lead", "next_node_id": "owner" },
                { "id": "owner", "name": "Space owner" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

async fn start(app: &Router) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/flows/doc-approve/instances",
        Some(json!({ "business_id": "doc-42", "space_id": "s1", "created_by": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_owned()
}

async fn act(app: &Router, id: &str, action: &str) -> (StatusCode, Value) {
    call(
        app,
        Method::POST,
        &format!("/api/instances/{id}/actions"),
        Some(json!({ "actor_id": "bob", "comment": "ok", "action": action })),
    )
    .await
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (status, body) = call(&app(), Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn registered_flow_is_listed_and_fetchable() {
    let app = app();
    register_two_step(&app).await;

    let (status, body) = call(&app, Method::GET, "/api/flows/doc-approve", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], "doc-approve");
    assert_eq!(body["nodes"][0]["type"], "approval");

    let (status, body) = call(&app, Method::GET, "/api/flows", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn registration_validation_errors_are_400() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/flows",
        Some(json!({ "code": " ", "nodes": [{ "id": "a" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "code is required");

    let (status, body) =
        call(&app, Method::POST, "/api/flows", Some(json!({ "code": "x", "nodes": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "at least one node is required");
}

#[tokio::test]
async fn malformed_body_is_invalid_json() {
    let app = app();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/flows")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "invalid json");
}

#[tokio::test]
async fn unknown_flow_and_instance_are_404() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/api/flows/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "definition not found");

    let (status, _) = call(&app, Method::GET, "/api/flows/nope/instances", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/flows/nope/instances",
        Some(json!({ "business_id": "doc-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "definition not found");

    let (status, body) = call(&app, Method::GET, "/api/instances/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "instance not found");

    let (status, body) = act(&app, "ghost", "approve").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "instance not found");
}

#[tokio::test]
async fn blank_business_id_is_400() {
    let app = app();
    register_two_step(&app).await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/flows/doc-approve/instances",
        Some(json!({ "business_id": "", "unexpected": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "business id required");
}

#[tokio::test]
async fn approvals_walk_the_flow_then_close_it() {
    let app = app();
    register_two_step(&app).await;
    let id = start(&app).await;

    let (status, body) = act(&app, &id, "approve").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["current_node_id"], "owner");

    let (status, body) = act(&app, &id, "approve").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");
    assert_eq!(body["current_node_id"], "");
    assert_eq!(body["history"].as_array().unwrap().len(), 2);
    assert!(body["completed_at"].is_string());

    let (status, body) = act(&app, &id, "reject").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "instance already closed");

    let (status, body) = call(&app, Method::GET, "/api/flows/doc-approve/instances", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], id.as_str());
}

#[tokio::test]
async fn reject_closes_immediately() {
    let app = app();
    register_two_step(&app).await;
    let id = start(&app).await;

    let (status, body) = act(&app, &id, "reject").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["history"][0]["node_id"], "lead");
    assert_eq!(body["history"][0]["action"], "reject");
}

#[tokio::test]
async fn unsupported_action_leaves_instance_untouched() {
    let app = app();
    register_two_step(&app).await;
    let id = start(&app).await;

    let (status, body) = act(&app, &id, "cancel").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unsupported action");

    let (_, body) = call(&app, Method::GET, &format!("/api/instances/{id}"), None).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["current_node_id"], "lead");
    assert!(body["history"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let resp = app().oneshot(req).await.unwrap();
    assert!(resp.headers().contains_key("x-request-id"));

    let req = Request::builder()
        .uri("/healthz")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();
    assert_eq!(resp.headers()["x-request-id"], "abc-123");
}

struct BrokenStore;

fn broken() -> EngineError {
    EngineError::storage(std::io::Error::other("connection refused to 10.0.0.7"))
}

#[async_trait]
impl WorkflowStore for BrokenStore {
    async fn get_definition(&self, _: &str) -> Result<Option<FlowDefinition>, EngineError> {
        Err(broken())
    }
    async fn get_definition_by_code(&self, _: &str) -> Result<Option<FlowDefinition>, EngineError> {
        Err(broken())
    }
    async fn list_definitions(&self) -> Result<Vec<FlowDefinition>, EngineError> {
        Err(broken())
    }
    async fn save_definition(&self, _: &FlowDefinition) -> Result<(), EngineError> {
        Err(broken())
    }
    async fn get_instance(&self, _: &str) -> Result<Option<FlowInstance>, EngineError> {
        Err(broken())
    }
    async fn save_instance(&self, _: &FlowInstance) -> Result<(), EngineError> {
        Err(broken())
    }
    async fn list_instances_by_definition(&self, _: &str) -> Result<Vec<FlowInstance>, EngineError> {
        Err(broken())
    }
}

#[tokio::test]
async fn storage_failures_hide_details() {
    let app = router(Arc::new(Workflow::with_store(Arc::new(BrokenStore))));
    let (status, body) = call(&app, Method::GET, "/api/flows", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal error");
}

#[tokio::test]
async fn action_literal_is_checked_before_the_instance_lookup() {
    let app = app();
    let (status, body) = act(&app, "ghost", "cancel").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unsupported action");
}
