// `uplink upload` — split a file into fixed-size chunks and push them
// with a bounded number in flight.
//
// Each chunk gets one retry before the upload is treated as failed; a
// chunk that fails twice aborts the remaining submissions and leaves
// the session on the server for `uplink cancel`/`uplink cleanup`.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use uplink_common::protocol::rest::{ChunkUploadResponse, InitializeUploadRequest};
use uplink_common::types::UploadStatus;

use crate::client::UploadClient;
use crate::config;
use crate::output::{self, OutputFormat};

const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;
const DEFAULT_CONCURRENCY: usize = 3;

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// File to upload.
    pub file: PathBuf,
    /// Server base URL.
    #[arg(long)]
    server: Option<String>,
    /// Chunk size in bytes.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: u64,
    /// Maximum chunks in flight at once.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,
    /// Mime type; inferred from the file extension when omitted.
    #[arg(long)]
    mime_type: Option<String>,
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
pub struct UploadResult {
    pub upload_id: Uuid,
    pub file_name: String,
    pub file_size: u64,
    pub total_chunks: u64,
    pub status: UploadStatus,
}

pub fn run(args: UploadArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let server_url = config::resolve_server_url(args.server.as_deref());

    let result = tokio::runtime::Handle::try_current()
        .map(|h| h.block_on(run_upload(&server_url, &args, format)))
        .unwrap_or_else(|_| {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("tokio runtime should build")
                .block_on(run_upload(&server_url, &args, format))
        });

    match result {
        Ok(result) => {
            output::print_output(format, &result, format_human)?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

async fn run_upload(
    server_url: &str,
    args: &UploadArgs,
    format: OutputFormat,
) -> anyhow::Result<UploadResult> {
    anyhow::ensure!(args.chunk_size > 0, "chunk size must be greater than zero");
    anyhow::ensure!(args.concurrency > 0, "concurrency must be greater than zero");

    let file_name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("`{}` has no usable file name", args.file.display()))?;
    let file_size = tokio::fs::metadata(&args.file)
        .await
        .with_context(|| format!("cannot read `{}`", args.file.display()))?
        .len();
    anyhow::ensure!(file_size > 0, "`{}` is empty", args.file.display());

    let mime_type = args
        .mime_type
        .clone()
        .unwrap_or_else(|| mime_for_extension(&args.file).to_string());

    let client = Arc::new(UploadClient::new(server_url)?);
    let init = client
        .initialize(&InitializeUploadRequest {
            file_name: file_name.clone(),
            file_size,
            chunk_size: args.chunk_size,
            mime_type,
        })
        .await
        .context("failed to initialize upload")?;

    if format == OutputFormat::Human {
        println!(
            "uploading {file_name} ({file_size} bytes, {} chunk(s) of up to {} bytes) as {}",
            init.total_chunks, args.chunk_size, init.upload_id
        );
    }

    let in_flight = Arc::new(Semaphore::new(args.concurrency));
    let mut submissions = JoinSet::new();
    for index in 0..init.total_chunks {
        let permit = Arc::clone(&in_flight)
            .acquire_owned()
            .await
            .expect("upload semaphore is never closed");
        let client = Arc::clone(&client);
        let path = args.file.clone();
        let upload_id = init.upload_id;
        let chunk_size = args.chunk_size;
        submissions.spawn(async move {
            let _permit = permit;
            submit_with_retry(&client, &path, upload_id, index, chunk_size, file_size).await
        });
    }

    let mut failure: Option<anyhow::Error> = None;
    while let Some(joined) = submissions.join_next().await {
        match joined {
            Ok(Ok(outcome)) => {
                if format == OutputFormat::Human {
                    println!(
                        "  chunk {} ok — {}% ({})",
                        outcome.chunk_index, outcome.progress, outcome.status
                    );
                }
            }
            Ok(Err(error)) => {
                if failure.is_none() {
                    failure = Some(error);
                    submissions.abort_all();
                }
            }
            // a task we aborted after the first failure
            Err(join_error) if join_error.is_cancelled() => {}
            Err(join_error) => {
                if failure.is_none() {
                    failure = Some(anyhow::anyhow!(join_error).context("chunk task panicked"));
                    submissions.abort_all();
                }
            }
        }
    }

    if let Some(error) = failure {
        return Err(error.context(format!(
            "upload {} failed; the session is left on the server (use `uplink cancel {}` to \
             discard it)",
            init.upload_id, init.upload_id
        )));
    }

    let info = client
        .session_info(init.upload_id)
        .await
        .context("upload finished but the final status could not be fetched")?;

    Ok(UploadResult {
        upload_id: init.upload_id,
        file_name,
        file_size,
        total_chunks: init.total_chunks,
        status: info.status,
    })
}

/// One retry per chunk, using the same in-flight slot, before the
/// failure becomes fatal for the whole upload.
async fn submit_with_retry(
    client: &UploadClient,
    path: &Path,
    upload_id: Uuid,
    index: u64,
    chunk_size: u64,
    file_size: u64,
) -> anyhow::Result<ChunkUploadResponse> {
    let bytes = read_chunk(path, index, chunk_size, file_size).await?;
    match client.submit_chunk(upload_id, index, bytes.clone()).await {
        Ok(outcome) => Ok(outcome),
        Err(first_error) => client
            .submit_chunk(upload_id, index, bytes)
            .await
            .map_err(|second_error| {
                second_error
                    .context(format!("chunk {index} failed twice; first error: {first_error:#}"))
            }),
    }
}

async fn read_chunk(
    path: &Path,
    index: u64,
    chunk_size: u64,
    file_size: u64,
) -> anyhow::Result<Vec<u8>> {
    let offset = index * chunk_size;
    let len = chunk_size.min(file_size - offset) as usize;

    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("cannot open `{}`", path.display()))?;
    file.seek(SeekFrom::Start(offset))
        .await
        .with_context(|| format!("cannot seek to chunk {index}"))?;

    let mut bytes = vec![0u8; len];
    file.read_exact(&mut bytes)
        .await
        .with_context(|| format!("cannot read chunk {index} ({len} bytes at offset {offset})"))?;
    Ok(bytes)
}

fn mime_for_extension(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

fn format_human(result: &UploadResult) -> String {
    format!(
        "{} uploaded — {} bytes in {} chunk(s), status {} (id: {})",
        result.file_name, result.file_size, result.total_chunks, result.status, result.upload_id
    )
}
