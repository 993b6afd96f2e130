// Typed HTTP client for the uplink server API.
//
// Every call retries once on a transient failure (connection refused,
// timeout, or a server error the API marks retryable) before giving up.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use uplink_common::protocol::rest::{
    AckResponse, ActiveSessionsResponse, ChunkUploadResponse, InitializeUploadRequest,
    InitializeUploadResponse, ServerStatsResponse, SessionInfoResponse,
};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A structured error response from the upload API.
#[derive(Debug)]
pub struct ApiFailure {
    pub status: u16,
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, http {})", self.message, self.code, self.status)
    }
}

impl std::error::Error for ApiFailure {}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(default)]
    retryable: bool,
}

#[derive(Debug, Clone)]
pub struct UploadClient {
    http: reqwest::Client,
    base_url: Url,
}

impl UploadClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("invalid server url `{base_url}`"))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The realtime channel endpoint derived from the base URL
    /// (`http` -> `ws`, `https` -> `wss`).
    pub fn ws_url(&self) -> Result<Url> {
        let mut url = self.join("ws")?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow::anyhow!("cannot derive websocket scheme for `{url}`"))?;
        Ok(url)
    }

    pub async fn initialize(
        &self,
        request: &InitializeUploadRequest,
    ) -> Result<InitializeUploadResponse> {
        let url = self.join("api/upload/initialize")?;
        self.execute(self.http.post(url).json(request)).await
    }

    pub async fn submit_chunk(
        &self,
        upload_id: Uuid,
        chunk_index: u64,
        bytes: Vec<u8>,
    ) -> Result<ChunkUploadResponse> {
        let url = self.join(&format!("api/upload/{upload_id}/chunk/{chunk_index}"))?;
        self.execute(
            self.http
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(bytes),
        )
        .await
    }

    pub async fn session_info(&self, upload_id: Uuid) -> Result<SessionInfoResponse> {
        let url = self.join(&format!("api/upload/{upload_id}"))?;
        self.execute(self.http.get(url)).await
    }

    pub async fn active_sessions(&self) -> Result<ActiveSessionsResponse> {
        let url = self.join("api/upload/active")?;
        self.execute(self.http.get(url)).await
    }

    pub async fn cancel(&self, upload_id: Uuid) -> Result<AckResponse> {
        let url = self.join(&format!("api/upload/{upload_id}/cancel"))?;
        self.execute(self.http.post(url)).await
    }

    pub async fn cleanup(&self, upload_id: Uuid) -> Result<AckResponse> {
        let url = self.join(&format!("api/upload/{upload_id}"))?;
        self.execute(self.http.delete(url)).await
    }

    pub async fn stats(&self) -> Result<ServerStatsResponse> {
        let url = self.join("api/stats")?;
        self.execute(self.http.get(url)).await
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("cannot build request url for `{path}`"))
    }

    async fn execute<R>(&self, request: reqwest::RequestBuilder) -> Result<R>
    where
        R: DeserializeOwned,
    {
        // All API operations are idempotent, so one blind retry is safe.
        let retry = request.try_clone();
        match self.execute_once(request).await {
            Ok(response) => Ok(response),
            Err(first_error) if is_transient(&first_error) => {
                let Some(retry) = retry else {
                    return Err(first_error);
                };
                self.execute_once(retry).await.map_err(|second_error| {
                    second_error.context(format!(
                        "request failed after retry; first error: {first_error:#}"
                    ))
                })
            }
            Err(error) => Err(error),
        }
    }

    async fn execute_once<R>(&self, request: reqwest::RequestBuilder) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let response = request
            .send()
            .await
            .with_context(|| format!("failed to reach server at {}", self.base_url))?;
        let status = response.status();

        if status.is_success() {
            return response.json().await.context("failed to decode server response");
        }

        let body = response.bytes().await.unwrap_or_default();
        match serde_json::from_slice::<ErrorEnvelope>(&body) {
            Ok(envelope) => Err(anyhow::anyhow!(ApiFailure {
                status: status.as_u16(),
                code: envelope.error.code,
                message: envelope.error.message,
                retryable: envelope.error.retryable,
            })),
            Err(_) => Err(anyhow::anyhow!(
                "server returned http {} with an unexpected body",
                status.as_u16()
            )),
        }
    }
}

fn is_transient(error: &anyhow::Error) -> bool {
    if let Some(failure) = error.downcast_ref::<ApiFailure>() {
        return failure.retryable;
    }
    error
        .downcast_ref::<reqwest::Error>()
        .is_some_and(|e| e.is_connect() || e.is_timeout())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_swaps_scheme_and_keeps_host() {
        let client = UploadClient::new("http://127.0.0.1:8080").expect("client builds");
        let ws = client.ws_url().expect("ws url derives");
        assert_eq!(ws.as_str(), "ws://127.0.0.1:8080/ws");

        let client = UploadClient::new("https://uploads.example.com").expect("client builds");
        assert_eq!(client.ws_url().expect("ws url derives").as_str(), "wss://uploads.example.com/ws");
    }

    #[test]
    fn invalid_server_url_is_rejected() {
        assert!(UploadClient::new("not a url").is_err());
    }

    #[test]
    fn api_failure_controls_retry_decision() {
        let retryable = anyhow::anyhow!(ApiFailure {
            status: 507,
            code: "STORAGE_FAILED".into(),
            message: "server could not persist data".into(),
            retryable: true,
        });
        assert!(is_transient(&retryable));

        let fatal = anyhow::anyhow!(ApiFailure {
            status: 404,
            code: "UPLOAD_NOT_FOUND".into(),
            message: "upload session not found".into(),
            retryable: false,
        });
        assert!(!is_transient(&fatal));

        // context layers must not hide the failure from the retry check
        let wrapped = retryable_error().context("submitting chunk 3");
        assert!(is_transient(&wrapped));
    }

    fn retryable_error() -> anyhow::Error {
        anyhow::anyhow!(ApiFailure {
            status: 507,
            code: "STORAGE_FAILED".into(),
            message: "server could not persist data".into(),
            retryable: true,
        })
    }

    #[test]
    fn error_envelope_decodes_server_error_bodies() {
        let raw = r#"{"error":{"code":"CHUNK_SIZE_MISMATCH","message":"chunk length 7 does not match expected length 4","retryable":false,"request_id":"req-1","details":{}}}"#;
        let envelope: ErrorEnvelope = serde_json::from_str(raw).expect("envelope decodes");
        assert_eq!(envelope.error.code, "CHUNK_SIZE_MISMATCH");
        assert!(!envelope.error.retryable);
    }
}
