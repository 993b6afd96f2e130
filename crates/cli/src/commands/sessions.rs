// `uplink sessions` — list live upload sessions.

use clap::Args;

use uplink_common::protocol::rest::ActiveSessionsResponse;

use crate::client::UploadClient;
use crate::config;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct SessionsArgs {
    /// Server base URL.
    #[arg(long)]
    server: Option<String>,
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

pub fn run(args: SessionsArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let server_url = config::resolve_server_url(args.server.as_deref());

    let result = tokio::runtime::Handle::try_current()
        .map(|h| h.block_on(call_sessions(&server_url)))
        .unwrap_or_else(|_| {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("tokio runtime should build")
                .block_on(call_sessions(&server_url))
        });

    match result {
        Ok(sessions) => {
            output::print_output(format, &sessions, format_human)?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

async fn call_sessions(server_url: &str) -> anyhow::Result<ActiveSessionsResponse> {
    let client = UploadClient::new(server_url)?;
    client.active_sessions().await
}

fn format_human(response: &ActiveSessionsResponse) -> String {
    if response.sessions.is_empty() {
        return "No active upload sessions.".into();
    }

    let mut lines = Vec::new();
    lines.push(format!("{} session(s)", response.sessions.len()));
    for s in &response.sessions {
        lines.push(format!(
            "  {}  {} — {} ({}/{} chunks)",
            s.upload_id, s.file_name, s.status, s.received_chunks, s.total_chunks
        ));
    }
    lines.join("\n")
}
