// `uplink stats` — broadcaster and registry counters.

use clap::Args;

use uplink_common::protocol::rest::ServerStatsResponse;

use crate::client::UploadClient;
use crate::config;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Server base URL.
    #[arg(long)]
    server: Option<String>,
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

pub fn run(args: StatsArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let server_url = config::resolve_server_url(args.server.as_deref());

    let result = tokio::runtime::Handle::try_current()
        .map(|h| h.block_on(call_stats(&server_url)))
        .unwrap_or_else(|_| {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("tokio runtime should build")
                .block_on(call_stats(&server_url))
        });

    match result {
        Ok(stats) => {
            output::print_output(format, &stats, format_human)?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

async fn call_stats(server_url: &str) -> anyhow::Result<ServerStatsResponse> {
    let client = UploadClient::new(server_url)?;
    client.stats().await
}

fn format_human(stats: &ServerStatsResponse) -> String {
    format!(
        "{} connected client(s), {} open room(s), {} active session(s)",
        stats.connected_clients, stats.open_rooms, stats.active_sessions
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_format_shows_all_counters() {
        let stats =
            ServerStatsResponse { connected_clients: 4, open_rooms: 2, active_sessions: 3 };
        let line = format_human(&stats);
        assert!(line.contains("4 connected client(s)"));
        assert!(line.contains("2 open room(s)"));
        assert!(line.contains("3 active session(s)"));
    }
}
