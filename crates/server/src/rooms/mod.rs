// Room-scoped event fan-out for upload progress.
//
// One room per upload id. A connection may sit in many rooms; a room is
// created on first join and deleted when its last member leaves or
// disconnects. Delivery is best-effort per subscriber: a gone or slow
// connection never blocks the others — recipients are snapshotted under
// the read lock and sends go through each connection's unbounded
// outbound queue.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use uplink_common::protocol::ws::WsMessage;
use uplink_common::types::{ProcessingResult, SessionSnapshot};

/// A domain event scoped to one upload. `emit` stamps the upload id and
/// a server timestamp onto the outgoing message.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    Progress {
        progress: u8,
        received_chunks: u64,
        total_chunks: u64,
    },
    Complete {
        file_name: String,
        file_size: u64,
        upload_time_ms: u64,
        path: String,
    },
    ProcessingStart {
        file_name: String,
    },
    ProcessingUpdate {
        step: String,
        progress: u8,
    },
    ProcessingComplete {
        result: ProcessingResult,
    },
    Error {
        error: String,
    },
}

impl RoomEvent {
    fn into_message(self, upload_id: Uuid, timestamp: DateTime<Utc>) -> WsMessage {
        match self {
            Self::Progress { progress, received_chunks, total_chunks } => {
                WsMessage::UploadProgress { upload_id, progress, received_chunks, total_chunks, timestamp }
            }
            Self::Complete { file_name, file_size, upload_time_ms, path } => {
                WsMessage::UploadComplete { upload_id, file_name, file_size, upload_time_ms, path, timestamp }
            }
            Self::ProcessingStart { file_name } => {
                WsMessage::ProcessingStart { upload_id, file_name, timestamp }
            }
            Self::ProcessingUpdate { step, progress } => {
                WsMessage::ProcessingUpdate { upload_id, step, progress, timestamp }
            }
            Self::ProcessingComplete { result } => {
                WsMessage::ProcessingComplete { upload_id, result, timestamp }
            }
            Self::Error { error } => WsMessage::UploadError { upload_id, error, timestamp },
        }
    }
}

struct ConnectionRecord {
    connected_at: DateTime<Utc>,
    rooms: HashSet<Uuid>,
    outbound: mpsc::UnboundedSender<WsMessage>,
}

#[derive(Default)]
struct RoomState {
    connections: HashMap<Uuid, ConnectionRecord>,
    rooms: HashMap<Uuid, HashSet<Uuid>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomStats {
    pub connected_clients: usize,
    pub open_rooms: usize,
}

#[derive(Default)]
pub struct RoomRegistry {
    state: RwLock<RoomState>,
    snapshots: RwLock<HashMap<Uuid, SessionSnapshot>>,
}

impl RoomRegistry {
    /// Track a new connection and its outbound queue.
    pub async fn register(&self, connection_id: Uuid, outbound: mpsc::UnboundedSender<WsMessage>) {
        let mut state = self.state.write().await;
        state.connections.insert(
            connection_id,
            ConnectionRecord { connected_at: Utc::now(), rooms: HashSet::new(), outbound },
        );
    }

    /// Add a connection to an upload's room, creating the room if absent.
    /// Idempotent. Returns false for an unknown connection.
    pub async fn join(&self, connection_id: Uuid, upload_id: Uuid) -> bool {
        let mut state = self.state.write().await;
        let Some(record) = state.connections.get_mut(&connection_id) else {
            return false;
        };
        record.rooms.insert(upload_id);
        state.rooms.entry(upload_id).or_default().insert(connection_id);
        true
    }

    /// Remove a connection from a room; the room is deleted once empty.
    pub async fn leave(&self, connection_id: Uuid, upload_id: Uuid) {
        let mut state = self.state.write().await;
        if let Some(record) = state.connections.get_mut(&connection_id) {
            record.rooms.remove(&upload_id);
        }
        if let Some(members) = state.rooms.get_mut(&upload_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                state.rooms.remove(&upload_id);
            }
        }
    }

    /// Unwind every room membership of a disconnected connection. The
    /// only path that mutates multiple rooms at once.
    pub async fn on_disconnect(&self, connection_id: Uuid) {
        let mut state = self.state.write().await;
        let Some(record) = state.connections.remove(&connection_id) else {
            return;
        };
        for upload_id in record.rooms {
            if let Some(members) = state.rooms.get_mut(&upload_id) {
                members.remove(&connection_id);
                if members.is_empty() {
                    state.rooms.remove(&upload_id);
                }
            }
        }
    }

    /// Deliver an event to every current member of the upload's room.
    /// Returns how many members were reachable when queueing.
    pub async fn emit(&self, upload_id: Uuid, event: RoomEvent) -> usize {
        let message = event.into_message(upload_id, Utc::now());

        let recipients: Vec<mpsc::UnboundedSender<WsMessage>> = {
            let state = self.state.read().await;
            let Some(members) = state.rooms.get(&upload_id) else {
                return 0;
            };
            members
                .iter()
                .filter_map(|connection_id| {
                    state.connections.get(connection_id).map(|record| record.outbound.clone())
                })
                .collect()
        };

        let mut sent = 0;
        for recipient in recipients {
            if recipient.send(message.clone()).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Push a message to every connection regardless of rooms (heartbeat).
    pub async fn broadcast_all(&self, message: WsMessage) -> usize {
        let recipients: Vec<mpsc::UnboundedSender<WsMessage>> = {
            let state = self.state.read().await;
            state.connections.values().map(|record| record.outbound.clone()).collect()
        };

        let mut sent = 0;
        for recipient in recipients {
            if recipient.send(message.clone()).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Store the latest session snapshot for late-joining subscribers.
    /// No event history is kept; this replaces whatever was there.
    pub async fn record_snapshot(&self, snapshot: SessionSnapshot) {
        self.snapshots.write().await.insert(snapshot.upload_id, snapshot);
    }

    /// Latest known snapshot for an upload, if any events were recorded.
    pub async fn status(&self, upload_id: Uuid) -> Option<SessionSnapshot> {
        self.snapshots.read().await.get(&upload_id).cloned()
    }

    /// Drop the stored snapshot once a session is cleaned up.
    pub async fn forget_upload(&self, upload_id: Uuid) {
        self.snapshots.write().await.remove(&upload_id);
    }

    pub async fn connected_clients(&self) -> usize {
        self.state.read().await.connections.len()
    }

    pub async fn room_members(&self, upload_id: Uuid) -> usize {
        self.state.read().await.rooms.get(&upload_id).map_or(0, HashSet::len)
    }

    pub async fn has_room(&self, upload_id: Uuid) -> bool {
        self.state.read().await.rooms.contains_key(&upload_id)
    }

    pub async fn connected_at(&self, connection_id: Uuid) -> Option<DateTime<Utc>> {
        self.state.read().await.connections.get(&connection_id).map(|r| r.connected_at)
    }

    pub async fn stats(&self) -> RoomStats {
        let state = self.state.read().await;
        RoomStats { connected_clients: state.connections.len(), open_rooms: state.rooms.len() }
    }
}
