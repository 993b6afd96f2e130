use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use uplink_common::protocol::ws::WsMessage;

use crate::rooms::RoomRegistry;

use super::protocol as ws_protocol;
use super::{MAX_FRAME_BYTES, PING_INTERVAL_MS, PONG_TIMEOUT_MS};

pub fn router(rooms: Arc<RoomRegistry>) -> Router {
    Router::new().route("/ws", get(ws_upgrade)).with_state(rooms)
}

async fn ws_upgrade(
    State(rooms): State<Arc<RoomRegistry>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.max_frame_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| handle_socket(rooms, socket))
}

async fn handle_socket(rooms: Arc<RoomRegistry>, mut socket: WebSocket) {
    let connection_id = Uuid::new_v4();
    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<WsMessage>();
    rooms.register(connection_id, outbound_sender).await;
    debug!(connection_id = %connection_id, "websocket connected");

    // Liveness: server pings every PING_INTERVAL_MS, disconnects if no
    // pong arrives within PONG_TIMEOUT_MS of the following ping tick.
    let mut ping_interval =
        tokio::time::interval(std::time::Duration::from_millis(PING_INTERVAL_MS));
    ping_interval.reset(); // skip immediate first tick
    let mut last_pong = Instant::now();
    let pong_deadline = std::time::Duration::from_millis(PING_INTERVAL_MS + PONG_TIMEOUT_MS);

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if last_pong.elapsed() > pong_deadline {
                    warn!(connection_id = %connection_id, "pong timeout, disconnecting");
                    break;
                }
                if socket.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
            maybe_outbound = outbound_receiver.recv() => {
                match maybe_outbound {
                    Some(outbound_message) => {
                        if ws_protocol::send_ws_message(&mut socket, &outbound_message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                match message {
                    Ok(Message::Text(raw_message)) => {
                        if raw_message.len() > MAX_FRAME_BYTES {
                            break;
                        }

                        let inbound = match ws_protocol::decode_message(&raw_message) {
                            Ok(message) => message,
                            Err(_) => {
                                let reply = invalid_frame_error();
                                if ws_protocol::send_ws_message(&mut socket, &reply).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };

                        let reply = handle_inbound(&rooms, connection_id, inbound).await;
                        if let Some(reply) = reply {
                            if ws_protocol::send_ws_message(&mut socket, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {
                        last_pong = Instant::now();
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
    }

    // Unwind every room membership; empty rooms are garbage-collected.
    rooms.on_disconnect(connection_id).await;
    debug!(connection_id = %connection_id, "websocket disconnected");
}

/// Dispatch one client frame. Returns the direct reply for the sending
/// connection, if the frame warrants one.
pub(crate) async fn handle_inbound(
    rooms: &RoomRegistry,
    connection_id: Uuid,
    inbound: WsMessage,
) -> Option<WsMessage> {
    match inbound {
        WsMessage::JoinRoom { upload_id } => {
            if rooms.join(connection_id, upload_id).await {
                Some(WsMessage::RoomJoined { upload_id })
            } else {
                Some(WsMessage::Error {
                    code: "CONNECTION_NOT_REGISTERED".to_string(),
                    message: "connection is not registered".to_string(),
                })
            }
        }
        WsMessage::LeaveRoom { upload_id } => {
            rooms.leave(connection_id, upload_id).await;
            Some(WsMessage::RoomLeft { upload_id })
        }
        WsMessage::GetStatus { upload_id } => {
            let status = rooms.status(upload_id).await;
            Some(WsMessage::StatusResponse { upload_id, status })
        }
        WsMessage::Ping => Some(WsMessage::Pong { timestamp: Utc::now() }),
        _ => Some(WsMessage::Error {
            code: "UNSUPPORTED_MESSAGE".to_string(),
            message: "message type is not accepted from clients".to_string(),
        }),
    }
}

fn invalid_frame_error() -> WsMessage {
    WsMessage::Error {
        code: "INVALID_MESSAGE".to_string(),
        message: "invalid websocket frame payload".to_string(),
    }
}
