// `uplink cleanup` — remove an upload session and every blob it owns.
// Valid for finished uploads too; always succeeds.

use clap::Args;
use serde::Serialize;
use uuid::Uuid;

use crate::client::UploadClient;
use crate::config;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct CleanupArgs {
    /// Upload id to remove.
    pub upload_id: Uuid,
    /// Server base URL.
    #[arg(long)]
    server: Option<String>,
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct CleanupResult {
    upload_id: Uuid,
    removed: bool,
}

pub fn run(args: CleanupArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let server_url = config::resolve_server_url(args.server.as_deref());

    let result = tokio::runtime::Handle::try_current()
        .map(|h| h.block_on(call_cleanup(&server_url, args.upload_id)))
        .unwrap_or_else(|_| {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("tokio runtime should build")
                .block_on(call_cleanup(&server_url, args.upload_id))
        });

    match result {
        Ok(result) => {
            output::print_output(format, &result, |r| {
                format!("upload {} removed", r.upload_id)
            })?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

async fn call_cleanup(server_url: &str, upload_id: Uuid) -> anyhow::Result<CleanupResult> {
    let client = UploadClient::new(server_url)?;
    let ack = client.cleanup(upload_id).await?;
    Ok(CleanupResult { upload_id, removed: ack.success })
}
