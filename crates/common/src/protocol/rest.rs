// REST request/response payloads for the upload API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{SessionSummary, UploadStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitializeUploadRequest {
    pub file_name: String,
    pub file_size: u64,
    pub chunk_size: u64,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitializeUploadResponse {
    pub upload_id: Uuid,
    pub total_chunks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkUploadResponse {
    pub upload_id: Uuid,
    pub chunk_index: u64,
    /// Whole percent, rounded half-up.
    pub progress: u8,
    pub status: UploadStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfoResponse {
    pub upload_id: Uuid,
    pub file_name: String,
    pub progress: u8,
    pub status: UploadStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveSessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

/// Returned by cancel and cleanup, which always succeed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AckResponse {
    pub success: bool,
}

/// Broadcaster / registry counters exposed for operators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerStatsResponse {
    pub connected_clients: usize,
    pub open_rooms: usize,
    pub active_sessions: usize,
}
