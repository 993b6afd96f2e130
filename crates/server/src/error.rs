use std::future::Future;

use axum::{
    http::{header::HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::upload::UploadError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_ID: String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationFailed,
    NotFound,
    InvalidUploadState,
    ChunkOutOfRange,
    ChunkSizeMismatch,
    CorruptSession,
    StorageFailed,
    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::NotFound => "UPLOAD_NOT_FOUND",
            Self::InvalidUploadState => "INVALID_UPLOAD_STATE",
            Self::ChunkOutOfRange => "CHUNK_OUT_OF_RANGE",
            Self::ChunkSizeMismatch => "CHUNK_SIZE_MISMATCH",
            Self::CorruptSession => "CORRUPT_SESSION",
            Self::StorageFailed => "STORAGE_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            Self::ValidationFailed => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidUploadState => StatusCode::CONFLICT,
            Self::ChunkOutOfRange => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::ChunkSizeMismatch => StatusCode::BAD_REQUEST,
            Self::CorruptSession => StatusCode::INTERNAL_SERVER_ERROR,
            Self::StorageFailed => StatusCode::INSUFFICIENT_STORAGE,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn retryable(self) -> bool {
        matches!(self, Self::StorageFailed | Self::InternalError)
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ValidationFailed => "request validation failed",
            Self::NotFound => "upload session not found",
            Self::InvalidUploadState => "operation not valid for the session's current status",
            Self::ChunkOutOfRange => "chunk index outside the session's chunk range",
            Self::ChunkSizeMismatch => "chunk length does not match the expected length",
            Self::CorruptSession => "upload session is corrupt",
            Self::StorageFailed => "server could not persist data",
            Self::InternalError => "internal server error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    details: Value,
    request_id: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: json!({}), request_id: None }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl From<UploadError> for ApiError {
    fn from(error: UploadError) -> Self {
        let code = match &error {
            UploadError::InvalidArgument(_) => ErrorCode::ValidationFailed,
            UploadError::NotFound(_) => ErrorCode::NotFound,
            UploadError::InvalidState { .. } => ErrorCode::InvalidUploadState,
            UploadError::OutOfRange { .. } => ErrorCode::ChunkOutOfRange,
            UploadError::ChunkSizeMismatch { .. } => ErrorCode::ChunkSizeMismatch,
            UploadError::CorruptSession { .. } => ErrorCode::CorruptSession,
            UploadError::IdCollision(_) => ErrorCode::InternalError,
            UploadError::Storage(_) => ErrorCode::StorageFailed,
        };
        Self::new(code, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = self.request_id.or_else(current_request_id);

        let mut response = (
            self.code.status(),
            Json(json!({
                "error": {
                    "code": self.code.as_str(),
                    "message": self.message,
                    "retryable": self.code.retryable(),
                    "request_id": request_id.clone(),
                    "details": self.details,
                }
            })),
        )
            .into_response();

        if let Some(request_id) = request_id {
            attach_request_id_header(&mut response, &request_id);
        }

        response
    }
}

pub async fn with_request_id_scope<F>(request_id: String, future: F) -> F::Output
where
    F: Future,
{
    REQUEST_ID.scope(request_id, future).await
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(Clone::clone).ok()
}

pub fn request_id_from_headers_or_generate(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn attach_request_id_header(response: &mut Response, request_id: &str) {
    if let Ok(header) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
}
