// `uplink cancel` — cancel an in-flight upload. Idempotent on the
// server: cancelling a finished or unknown upload still succeeds.

use clap::Args;
use serde::Serialize;
use uuid::Uuid;

use crate::client::UploadClient;
use crate::config;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct CancelArgs {
    /// Upload id to cancel.
    pub upload_id: Uuid,
    /// Server base URL.
    #[arg(long)]
    server: Option<String>,
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct CancelResult {
    upload_id: Uuid,
    cancelled: bool,
}

pub fn run(args: CancelArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let server_url = config::resolve_server_url(args.server.as_deref());

    let result = tokio::runtime::Handle::try_current()
        .map(|h| h.block_on(call_cancel(&server_url, args.upload_id)))
        .unwrap_or_else(|_| {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("tokio runtime should build")
                .block_on(call_cancel(&server_url, args.upload_id))
        });

    match result {
        Ok(result) => {
            output::print_output(format, &result, |r| {
                format!("upload {} cancelled", r.upload_id)
            })?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

async fn call_cancel(server_url: &str, upload_id: Uuid) -> anyhow::Result<CancelResult> {
    let client = UploadClient::new(server_url)?;
    let ack = client.cancel(upload_id).await?;
    Ok(CancelResult { upload_id, cancelled: ack.success })
}
