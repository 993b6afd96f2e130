// `uplink watch` — join an upload's room over the realtime channel and
// print its events until the upload reaches a terminal state.

use anyhow::Context;
use clap::Args;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use uplink_common::protocol::ws::WsMessage;
use uplink_common::types::SessionSnapshot;

use crate::client::UploadClient;
use crate::config;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Upload id to follow.
    pub upload_id: Uuid,
    /// Server base URL.
    #[arg(long)]
    server: Option<String>,
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

pub fn run(args: WatchArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let server_url = config::resolve_server_url(args.server.as_deref());

    let result = tokio::runtime::Handle::try_current()
        .map(|h| h.block_on(watch(&server_url, args.upload_id, format)))
        .unwrap_or_else(|_| {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("tokio runtime should build")
                .block_on(watch(&server_url, args.upload_id, format))
        });

    if let Err(e) = &result {
        output::print_anyhow_error(format, e);
    }
    result
}

async fn watch(server_url: &str, upload_id: Uuid, format: OutputFormat) -> anyhow::Result<()> {
    let ws_url = UploadClient::new(server_url)?.ws_url()?;
    let (mut stream, _) = tokio_tungstenite::connect_async(ws_url.as_str())
        .await
        .with_context(|| format!("failed to connect to {ws_url}"))?;

    send(&mut stream, &WsMessage::JoinRoom { upload_id }).await?;
    // catch up on the latest snapshot; there is no event replay
    send(&mut stream, &WsMessage::GetStatus { upload_id }).await?;

    while let Some(frame) = stream.next().await {
        let frame = frame.context("realtime channel closed unexpectedly")?;
        let raw = match frame {
            Message::Text(raw) => raw,
            Message::Close(_) => break,
            // transport ping/pong is handled by the websocket library
            _ => continue,
        };

        let Ok(event) = serde_json::from_str::<WsMessage>(raw.as_str()) else {
            continue;
        };

        match format {
            OutputFormat::Json => {
                if !matches!(event, WsMessage::Heartbeat { .. }) {
                    println!("{}", raw.as_str().trim_end());
                }
            }
            OutputFormat::Human => {
                if let Some(line) = render_event(&event) {
                    println!("{line}");
                }
            }
        }

        if is_terminal_event(&event) {
            break;
        }
    }

    Ok(())
}

async fn send<S>(stream: &mut S, message: &WsMessage) -> anyhow::Result<()>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let encoded = serde_json::to_string(message).context("failed to encode frame")?;
    stream.send(Message::Text(encoded.into())).await.context("failed to send frame")?;
    Ok(())
}

fn render_event(event: &WsMessage) -> Option<String> {
    match event {
        WsMessage::RoomJoined { upload_id } => Some(format!("watching upload {upload_id}")),
        WsMessage::StatusResponse { status, .. } => Some(render_snapshot(status.as_ref())),
        WsMessage::UploadProgress { progress, received_chunks, total_chunks, .. } => {
            Some(format!("progress {progress}% ({received_chunks}/{total_chunks} chunks)"))
        }
        WsMessage::UploadComplete { file_name, file_size, upload_time_ms, .. } => Some(format!(
            "upload complete: {file_name} ({file_size} bytes) in {upload_time_ms} ms"
        )),
        WsMessage::ProcessingStart { file_name, .. } => {
            Some(format!("processing started: {file_name}"))
        }
        WsMessage::ProcessingUpdate { step, progress, .. } => {
            Some(format!("processing: {step} ({progress}%)"))
        }
        WsMessage::ProcessingComplete { result, .. } => Some(format!(
            "processing complete: {} ({} bytes)",
            result.kind.as_str(),
            result.byte_len
        )),
        WsMessage::UploadError { error, .. } => Some(format!("error: {error}")),
        // heartbeats and acks carry nothing worth a line
        _ => None,
    }
}

fn render_snapshot(snapshot: Option<&SessionSnapshot>) -> String {
    match snapshot {
        Some(s) => format!(
            "status: {} — {} {}% ({}/{} chunks)",
            s.status, s.file_name, s.progress, s.received_chunks, s.total_chunks
        ),
        None => "status: upload not known to the server yet".to_string(),
    }
}

/// Whether this event ends the watch: the upload failed, processing
/// finished, or the catch-up snapshot already shows a terminal status.
fn is_terminal_event(event: &WsMessage) -> bool {
    match event {
        WsMessage::UploadError { .. } | WsMessage::ProcessingComplete { .. } => true,
        WsMessage::StatusResponse { status: Some(snapshot), .. } => snapshot.status.is_terminal(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uplink_common::types::{MediaKind, ProcessingResult, UploadStatus};

    fn snapshot(status: UploadStatus) -> SessionSnapshot {
        SessionSnapshot {
            upload_id: Uuid::nil(),
            file_name: "video.mp4".into(),
            file_size: 2_500_000,
            mime_type: "video/mp4".into(),
            progress: 100,
            received_chunks: 3,
            total_chunks: 3,
            status,
            created_at: Utc::now(),
            assembled_at: None,
            assembled_path: None,
            last_update: Utc::now(),
        }
    }

    #[test]
    fn progress_events_render_counts() {
        let event = WsMessage::UploadProgress {
            upload_id: Uuid::nil(),
            progress: 67,
            received_chunks: 2,
            total_chunks: 3,
            timestamp: Utc::now(),
        };
        let line = render_event(&event).expect("progress renders");
        assert!(line.contains("67%"));
        assert!(line.contains("2/3"));
    }

    #[test]
    fn heartbeats_render_nothing() {
        let event = WsMessage::Heartbeat { timestamp: Utc::now(), connected_clients: 7 };
        assert!(render_event(&event).is_none());
    }

    #[test]
    fn error_and_processing_complete_are_terminal() {
        assert!(is_terminal_event(&WsMessage::UploadError {
            upload_id: Uuid::nil(),
            error: "boom".into(),
            timestamp: Utc::now(),
        }));
        assert!(is_terminal_event(&WsMessage::ProcessingComplete {
            upload_id: Uuid::nil(),
            result: ProcessingResult {
                kind: MediaKind::Video,
                source: "assembled/x".into(),
                byte_len: 1,
            },
            timestamp: Utc::now(),
        }));
    }

    #[test]
    fn snapshot_terminality_follows_its_status() {
        let live = WsMessage::StatusResponse {
            upload_id: Uuid::nil(),
            status: Some(snapshot(UploadStatus::Uploading)),
        };
        assert!(!is_terminal_event(&live));

        let done = WsMessage::StatusResponse {
            upload_id: Uuid::nil(),
            status: Some(snapshot(UploadStatus::Completed)),
        };
        assert!(is_terminal_event(&done));

        // an unknown upload may simply not have started yet
        let unknown = WsMessage::StatusResponse { upload_id: Uuid::nil(), status: None };
        assert!(!is_terminal_event(&unknown));
        assert!(render_snapshot(None).contains("not known"));
    }

    #[test]
    fn in_flight_progress_events_are_not_terminal() {
        let event = WsMessage::UploadProgress {
            upload_id: Uuid::nil(),
            progress: 50,
            received_chunks: 1,
            total_chunks: 2,
            timestamp: Utc::now(),
        };
        assert!(!is_terminal_event(&event));
    }
}
