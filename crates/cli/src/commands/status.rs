// `uplink status` — show one upload session.

use clap::Args;
use uuid::Uuid;

use uplink_common::protocol::rest::SessionInfoResponse;

use crate::client::UploadClient;
use crate::config;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Upload id returned by `uplink upload`.
    pub upload_id: Uuid,
    /// Server base URL.
    #[arg(long)]
    server: Option<String>,
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

pub fn run(args: StatusArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let server_url = config::resolve_server_url(args.server.as_deref());

    let result = tokio::runtime::Handle::try_current()
        .map(|h| h.block_on(call_status(&server_url, args.upload_id)))
        .unwrap_or_else(|_| {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("tokio runtime should build")
                .block_on(call_status(&server_url, args.upload_id))
        });

    match result {
        Ok(info) => {
            output::print_output(format, &info, format_human)?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

async fn call_status(server_url: &str, upload_id: Uuid) -> anyhow::Result<SessionInfoResponse> {
    let client = UploadClient::new(server_url)?;
    client.session_info(upload_id).await
}

fn format_human(info: &SessionInfoResponse) -> String {
    format!("{} — {} {}%  (id: {})", info.file_name, info.status, info.progress, info.upload_id)
}
