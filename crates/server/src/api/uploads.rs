// Upload REST endpoints.
//
// Routes:
//   POST   /api/upload/initialize            — create a session
//   POST   /api/upload/{id}/chunk/{index}    — submit one chunk (raw body)
//   GET    /api/upload/{id}                  — session info
//   DELETE /api/upload/{id}                  — cleanup (always succeeds)
//   POST   /api/upload/{id}/cancel           — cancel (always succeeds)
//   GET    /api/upload/active                — list live sessions
//   GET    /api/stats                        — broadcaster/registry counters

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use uplink_common::protocol::rest::{
    AckResponse, ActiveSessionsResponse, ChunkUploadResponse, InitializeUploadRequest,
    InitializeUploadResponse, ServerStatsResponse, SessionInfoResponse,
};

use crate::error::ApiError;
use crate::rooms::RoomRegistry;
use crate::upload::UploadManager;

#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<UploadManager>,
    pub rooms: Arc<RoomRegistry>,
}

pub fn router(manager: Arc<UploadManager>, rooms: Arc<RoomRegistry>) -> Router {
    let state = ApiState { manager, rooms };
    Router::new()
        .route("/api/upload/initialize", post(initialize_upload))
        .route("/api/upload/active", get(active_sessions))
        .route("/api/upload/{id}", get(session_info).delete(cleanup_upload))
        .route("/api/upload/{id}/cancel", post(cancel_upload))
        .route("/api/upload/{id}/chunk/{index}", post(submit_chunk))
        .route("/api/stats", get(server_stats))
        .with_state(state)
}

async fn initialize_upload(
    State(state): State<ApiState>,
    Json(payload): Json<InitializeUploadRequest>,
) -> Result<Json<InitializeUploadResponse>, ApiError> {
    let initialized = state
        .manager
        .initialize(&payload.file_name, payload.file_size, payload.chunk_size, &payload.mime_type)
        .await?;
    Ok(Json(InitializeUploadResponse {
        upload_id: initialized.upload_id,
        total_chunks: initialized.total_chunks,
    }))
}

async fn submit_chunk(
    State(state): State<ApiState>,
    Path((upload_id, chunk_index)): Path<(Uuid, u64)>,
    body: Bytes,
) -> Result<Json<ChunkUploadResponse>, ApiError> {
    let outcome = state.manager.submit_chunk(upload_id, chunk_index, &body).await?;
    Ok(Json(ChunkUploadResponse {
        upload_id: outcome.upload_id,
        chunk_index: outcome.chunk_index,
        progress: outcome.progress,
        status: outcome.status,
    }))
}

async fn session_info(
    State(state): State<ApiState>,
    Path(upload_id): Path<Uuid>,
) -> Result<Json<SessionInfoResponse>, ApiError> {
    let snapshot = state.manager.session_info(upload_id).await?;
    Ok(Json(SessionInfoResponse {
        upload_id: snapshot.upload_id,
        file_name: snapshot.file_name,
        progress: snapshot.progress,
        status: snapshot.status,
    }))
}

async fn cleanup_upload(
    State(state): State<ApiState>,
    Path(upload_id): Path<Uuid>,
) -> Json<AckResponse> {
    state.manager.cleanup(upload_id).await;
    Json(AckResponse { success: true })
}

async fn cancel_upload(
    State(state): State<ApiState>,
    Path(upload_id): Path<Uuid>,
) -> Json<AckResponse> {
    state.manager.cancel(upload_id).await;
    Json(AckResponse { success: true })
}

async fn active_sessions(State(state): State<ApiState>) -> Json<ActiveSessionsResponse> {
    Json(ActiveSessionsResponse { sessions: state.manager.active_sessions().await })
}

async fn server_stats(State(state): State<ApiState>) -> Json<ServerStatsResponse> {
    let stats = state.rooms.stats().await;
    let active_sessions = state.manager.active_sessions().await.len();
    Json(ServerStatsResponse {
        connected_clients: stats.connected_clients,
        open_rooms: stats.open_rooms,
        active_sessions,
    })
}
