// Per-upload bookkeeping: which chunks have landed, and where in the
// lifecycle the session is.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use uplink_common::types::{SessionSnapshot, SessionSummary, UploadStatus};

/// One chunked transfer. Mutated only behind the registry's per-session
/// mutex; the completeness check and the assembly claim rely on that.
#[derive(Debug)]
pub struct UploadSession {
    pub id: Uuid,
    pub file_name: String,
    pub declared_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u64,
    pub mime_type: String,
    pub status: UploadStatus,
    pub received: HashSet<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub assembled_at: Option<DateTime<Utc>>,
    pub assembled_path: Option<String>,
}

pub fn total_chunks_for(declared_size: u64, chunk_size: u64) -> u64 {
    declared_size.div_ceil(chunk_size)
}

impl UploadSession {
    /// Both sizes must already be validated as non-zero.
    pub fn new(file_name: String, declared_size: u64, chunk_size: u64, mime_type: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            file_name,
            declared_size,
            chunk_size,
            total_chunks: total_chunks_for(declared_size, chunk_size),
            mime_type,
            status: UploadStatus::Initialized,
            received: HashSet::new(),
            created_at: now,
            updated_at: now,
            assembled_at: None,
            assembled_path: None,
        }
    }

    /// Expected byte length of chunk `index`; the last chunk carries the
    /// remainder.
    pub fn expected_chunk_len(&self, index: u64) -> u64 {
        debug_assert!(index < self.total_chunks);
        if index + 1 == self.total_chunks {
            self.declared_size - index * self.chunk_size
        } else {
            self.chunk_size
        }
    }

    /// Whole percent of chunks received, rounded half-up.
    pub fn progress(&self) -> u8 {
        let received = self.received.len() as u64;
        ((200 * received + self.total_chunks) / (2 * self.total_chunks)) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.received.len() as u64 == self.total_chunks
    }

    /// Record a chunk arrival. Returns false when the index had already
    /// been received (re-submissions overwrite bytes but do not change
    /// membership accounting).
    pub fn mark_received(&mut self, index: u64) -> bool {
        self.touch();
        if self.status == UploadStatus::Initialized {
            self.status = UploadStatus::Uploading;
        }
        self.received.insert(index)
    }

    /// The atomic assembly claim: exactly one caller observes the
    /// `Uploading -> Assembling` transition for a complete ledger.
    pub fn try_claim_assembly(&mut self) -> bool {
        if self.status == UploadStatus::Uploading && self.is_complete() {
            self.status = UploadStatus::Assembling;
            self.touch();
            true
        } else {
            false
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            upload_id: self.id,
            file_name: self.file_name.clone(),
            file_size: self.declared_size,
            mime_type: self.mime_type.clone(),
            progress: self.progress(),
            received_chunks: self.received.len() as u64,
            total_chunks: self.total_chunks,
            status: self.status,
            created_at: self.created_at,
            assembled_at: self.assembled_at,
            assembled_path: self.assembled_path.clone(),
            last_update: self.updated_at,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            upload_id: self.id,
            file_name: self.file_name.clone(),
            received_chunks: self.received.len() as u64,
            total_chunks: self.total_chunks,
            status: self.status,
        }
    }
}
