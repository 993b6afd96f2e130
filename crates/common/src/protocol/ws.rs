// WebSocket message types for the uplink realtime channel.
//
// One upload id maps to one room; subscribers join the room and receive
// every event for that upload. Server-emitted upload events always carry
// the upload id and a server timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ProcessingResult, SessionSnapshot};

/// All message types on the uplink realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Client -> Server: subscribe to an upload's events.
    JoinRoom { upload_id: Uuid },

    /// Client -> Server: unsubscribe from an upload's events.
    LeaveRoom { upload_id: Uuid },

    /// Client -> Server: request the latest session snapshot.
    GetStatus { upload_id: Uuid },

    /// Client -> Server: liveness probe.
    Ping,

    /// Server -> Client: subscription acknowledged.
    RoomJoined { upload_id: Uuid },

    /// Server -> Client: unsubscription acknowledged.
    RoomLeft { upload_id: Uuid },

    /// Server -> Client: latest snapshot, or `null` when the upload is
    /// unknown or has produced no events yet.
    StatusResponse {
        upload_id: Uuid,
        status: Option<SessionSnapshot>,
    },

    /// Server -> Client: answer to a `ping`.
    Pong { timestamp: DateTime<Utc> },

    /// Server -> Client: chunk arrival progress.
    UploadProgress {
        upload_id: Uuid,
        progress: u8,
        received_chunks: u64,
        total_chunks: u64,
        timestamp: DateTime<Utc>,
    },

    /// Server -> Client: all chunks assembled into the final file.
    UploadComplete {
        upload_id: Uuid,
        file_name: String,
        file_size: u64,
        upload_time_ms: u64,
        path: String,
        timestamp: DateTime<Utc>,
    },

    /// Server -> Client: media processing has started.
    ProcessingStart {
        upload_id: Uuid,
        file_name: String,
        timestamp: DateTime<Utc>,
    },

    /// Server -> Client: a named processing step and its percent.
    ProcessingUpdate {
        upload_id: Uuid,
        step: String,
        progress: u8,
        timestamp: DateTime<Utc>,
    },

    /// Server -> Client: processing finished.
    ProcessingComplete {
        upload_id: Uuid,
        result: ProcessingResult,
        timestamp: DateTime<Utc>,
    },

    /// Server -> Client: the upload or its processing failed.
    UploadError {
        upload_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Server -> Client: periodic liveness broadcast to every connection.
    Heartbeat {
        timestamp: DateTime<Utc>,
        connected_clients: usize,
    },

    /// Server -> Client: protocol-level error (bad frame, unknown type).
    Error { code: String, message: String },
}
