// Chunked upload lifecycle: session records, the registry that owns
// them, and the assembler that folds a complete chunk set into one file.

pub mod assembler;
pub mod registry;
pub mod session;

pub use registry::{ChunkOutcome, InitializedUpload, UploadLimits, UploadManager};
pub use session::UploadSession;

use thiserror::Error;
use uuid::Uuid;

use uplink_common::types::UploadStatus;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("upload session {0} not found")]
    NotFound(Uuid),

    #[error("operation not valid while session is {status}")]
    InvalidState { status: UploadStatus },

    #[error("chunk index {index} out of range for {total} chunks")]
    OutOfRange { index: u64, total: u64 },

    #[error("chunk length {got} does not match expected length {expected}")]
    ChunkSizeMismatch { expected: u64, got: u64 },

    #[error("chunk {missing} missing during assembly of upload {id}")]
    CorruptSession { id: Uuid, missing: u64 },

    #[error("upload id {0} already has a live session")]
    IdCollision(Uuid),

    #[error("storage failure")]
    Storage(#[from] std::io::Error),
}
