// uplink-server library: chunked upload sessions, assembly, media
// processing dispatch, and the room-scoped realtime broadcaster, plus
// the HTTP/WebSocket surface that exposes them.

pub mod api;
pub mod config;
pub mod cors;
pub mod error;
pub mod processing;
pub mod rooms;
pub mod store;
pub mod upload;
pub mod ws;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header::HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use std::{sync::Arc, time::Instant};
use tracing::{error, info};

use uplink_common::protocol::ws::WsMessage;

use crate::rooms::RoomRegistry;
use crate::upload::UploadManager;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn build_router(
    manager: Arc<UploadManager>,
    rooms: Arc<RoomRegistry>,
    max_request_body_bytes: usize,
    cors_origins: Option<&str>,
) -> Router {
    apply_middleware(
        Router::new()
            .route("/healthz", get(healthz))
            .merge(ws::router(Arc::clone(&rooms)))
            .merge(api::router(manager, rooms))
            .layer(cors::cors_layer(cors_origins)),
        max_request_body_bytes,
    )
}

pub fn apply_middleware(router: Router, max_request_body_bytes: usize) -> Router {
    router
        .layer(DefaultBodyLimit::max(max_request_body_bytes))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Periodic liveness broadcast to every connection, carrying the
/// connected-client count.
pub fn spawn_heartbeat(rooms: Arc<RoomRegistry>, interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // skip immediate first tick
        loop {
            ticker.tick().await;
            let connected_clients = rooms.connected_clients().await;
            rooms
                .broadcast_all(WsMessage::Heartbeat { timestamp: Utc::now(), connected_clients })
                .await;
        }
    });
}

/// Periodic sweep of stale terminal sessions.
pub fn spawn_sweeper(
    manager: Arc<UploadManager>,
    interval: std::time::Duration,
    max_age: std::time::Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let swept = manager.sweep_terminal_sessions(max_age).await;
            if swept > 0 {
                info!(swept, "swept stale terminal sessions");
            }
        }
    });
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = error::request_id_from_headers_or_generate(request.headers());

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response =
        error::with_request_id_scope(request_id.clone(), next.run(request)).await;

    if let Ok(request_id_header) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, request_id_header);
    }

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
