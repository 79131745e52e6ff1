//! `api` crate: HTTP REST adapter over the workflow engine.
//!
//! Exposes:
//!   GET  /healthz
//!   GET  /api/flows
//!   POST /api/flows
//!   GET  /api/flows/:code
//!   GET  /api/flows/:code/instances
//!   POST /api/flows/:code/instances
//!   GET  /api/instances/:id
//!   POST /api/instances/:id/actions

pub mod error;
pub mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::Request,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, info_span};

use engine::Workflow;

pub use error::ApiError;

pub type AppState = Arc<Workflow>;

/// Build the router with tracing, request-id and CORS middleware attached.
pub fn router(workflow: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route(
            "/api/flows",
            get(handlers::flows::list).post(handlers::flows::register),
        )
        .route("/api/flows/:code", get(handlers::flows::get))
        .route(
            "/api/flows/:code/instances",
            get(handlers::flows::list_instances).post(handlers::flows::start_instance),
        )
        .route("/api/instances/:id", get(handlers::instances::get))
        .route("/api/instances/:id/actions", post(handlers::instances::act))
        .with_state(workflow)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request| {
            let request_id = req
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            info_span!(
                "http_request",
                method = %req.method(),
                uri = %req.uri(),
                request_id
            )
        }))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(addr: &str, workflow: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "workflow api listening");
    axum::serve(listener, router(workflow))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod router_tests;
