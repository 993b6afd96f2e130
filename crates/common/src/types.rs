// Core domain types shared across all uplink crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one chunked upload session.
///
/// `Completed`, `Failed` and `Cancelled` are terminal; a terminal session
/// rejects further chunk submissions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Initialized,
    Uploading,
    Assembling,
    Assembled,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the session still accepts chunk submissions.
    pub fn accepts_chunks(self) -> bool {
        matches!(self, Self::Initialized | Self::Uploading)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Uploading => "uploading",
            Self::Assembling => "assembling",
            Self::Assembled => "assembled",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compact listing entry for an upload session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSummary {
    pub upload_id: Uuid,
    pub file_name: String,
    pub received_chunks: u64,
    pub total_chunks: u64,
    pub status: UploadStatus,
}

/// Latest known state of an upload session, as pushed to room subscribers
/// who ask for a catch-up. No event history is kept; this snapshot is the
/// only thing a late joiner can recover.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub upload_id: Uuid,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    /// Whole percent, rounded half-up.
    pub progress: u8,
    pub received_chunks: u64,
    pub total_chunks: u64,
    pub status: UploadStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assembled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assembled_path: Option<String>,
    pub last_update: DateTime<Utc>,
}

/// Broad media category used to pick a processing recipe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Document,
    Generic,
}

impl MediaKind {
    /// Classify by mime type prefix, the same buckets the processing
    /// pipeline distinguishes.
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.starts_with("image/") {
            Self::Image
        } else if mime_type.starts_with("video/") {
            Self::Video
        } else if mime_type.contains("pdf") || mime_type.contains("document") {
            Self::Document
        } else {
            Self::Generic
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
            Self::Generic => "generic",
        }
    }
}

/// Terminal result of a media processing run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessingResult {
    pub kind: MediaKind,
    /// Locator of the assembled source file the pipeline worked from.
    pub source: String,
    pub byte_len: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_reject_chunks() {
        for status in [UploadStatus::Completed, UploadStatus::Failed, UploadStatus::Cancelled] {
            assert!(status.is_terminal());
            assert!(!status.accepts_chunks());
        }
    }

    #[test]
    fn only_initialized_and_uploading_accept_chunks() {
        assert!(UploadStatus::Initialized.accepts_chunks());
        assert!(UploadStatus::Uploading.accepts_chunks());
        for status in [
            UploadStatus::Assembling,
            UploadStatus::Assembled,
            UploadStatus::Processing,
            UploadStatus::Completed,
            UploadStatus::Failed,
            UploadStatus::Cancelled,
        ] {
            assert!(!status.accepts_chunks(), "{status} should not accept chunks");
        }
    }

    #[test]
    fn media_kind_classification_matches_mime_prefixes() {
        assert_eq!(MediaKind::from_mime("image/png"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("video/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("application/pdf"), MediaKind::Document);
        assert_eq!(
            MediaKind::from_mime("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
            MediaKind::Document
        );
        assert_eq!(MediaKind::from_mime("application/zip"), MediaKind::Generic);
        assert_eq!(MediaKind::from_mime("text/plain"), MediaKind::Generic);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&UploadStatus::Uploading).expect("status serializes");
        assert_eq!(json, "\"uploading\"");
    }
}
