// Owns every live upload session and drives its lifecycle: initialize,
// chunk submission, assembly handoff, processing dispatch, cancel,
// cleanup, and the terminal-session sweep.
//
// Locking discipline: the sessions map sits behind one RwLock and holds
// `Arc<Mutex<UploadSession>>` per entry. The ledger's read-modify-write
// and the completeness check run under the per-session mutex, so two
// concurrent submissions of the last chunks cannot both claim assembly
// and cannot both miss it. Different sessions never contend. Assembly
// itself runs after the claim, outside the mutex.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use uplink_common::types::{SessionSnapshot, SessionSummary, UploadStatus};

use crate::processing::{MediaPipeline, PipelineEvent, ProcessingJob};
use crate::rooms::{RoomEvent, RoomRegistry};
use crate::store::{self, BlobStore};

use super::assembler::{self, AssembledOutput};
use super::session::UploadSession;
use super::UploadError;

const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Validation bounds applied at initialize.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_file_size: u64,
    /// `None` accepts any mime type.
    pub allowed_mime_types: Option<Vec<String>>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self { max_file_size: DEFAULT_MAX_FILE_SIZE, allowed_mime_types: None }
    }
}

/// Returned by a successful initialize.
#[derive(Debug, Clone, Copy)]
pub struct InitializedUpload {
    pub upload_id: Uuid,
    pub total_chunks: u64,
}

/// Result of one chunk submission, after any triggered assembly.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOutcome {
    pub upload_id: Uuid,
    pub chunk_index: u64,
    pub progress: u8,
    pub received_count: u64,
    pub total_chunks: u64,
    pub is_complete: bool,
    pub status: UploadStatus,
}

pub struct UploadManager {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<UploadSession>>>>,
    store: Arc<BlobStore>,
    rooms: Arc<RoomRegistry>,
    pipeline: Arc<MediaPipeline>,
    limits: UploadLimits,
    processing_slots: Arc<Semaphore>,
    processing_tasks: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
}

impl UploadManager {
    pub fn new(
        store: Arc<BlobStore>,
        rooms: Arc<RoomRegistry>,
        pipeline: MediaPipeline,
        limits: UploadLimits,
        processing_concurrency: usize,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            rooms,
            pipeline: Arc::new(pipeline),
            limits,
            processing_slots: Arc::new(Semaphore::new(processing_concurrency.max(1))),
            processing_tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a session in `Initialized` status and provision its chunk
    /// area. Ids are freshly generated v4 uuids; a colliding id is
    /// rejected rather than replacing the live session.
    pub async fn initialize(
        &self,
        file_name: &str,
        file_size: u64,
        chunk_size: u64,
        mime_type: &str,
    ) -> Result<InitializedUpload, UploadError> {
        if file_size == 0 {
            return Err(UploadError::InvalidArgument("file_size must be greater than zero".into()));
        }
        if chunk_size == 0 {
            return Err(UploadError::InvalidArgument("chunk_size must be greater than zero".into()));
        }
        if file_size > self.limits.max_file_size {
            return Err(UploadError::InvalidArgument(format!(
                "file_size {file_size} exceeds the maximum of {} bytes",
                self.limits.max_file_size
            )));
        }
        if let Some(allowed) = &self.limits.allowed_mime_types {
            if !allowed.iter().any(|m| m == mime_type) {
                return Err(UploadError::InvalidArgument(format!(
                    "mime type `{mime_type}` is not allowed"
                )));
            }
        }

        let session = UploadSession::new(
            store::sanitize_file_name(file_name),
            file_size,
            chunk_size,
            mime_type.to_string(),
        );
        let upload_id = session.id;
        let total_chunks = session.total_chunks;
        let snapshot = session.snapshot();

        {
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(&upload_id) {
                return Err(UploadError::IdCollision(upload_id));
            }
            sessions.insert(upload_id, Arc::new(Mutex::new(session)));
        }
        self.rooms.record_snapshot(snapshot).await;

        info!(upload_id = %upload_id, total_chunks, file_size, "initialized upload session");
        Ok(InitializedUpload { upload_id, total_chunks })
    }

    /// Persist a chunk, update the ledger, broadcast progress, and — for
    /// the submission that completes the set — win the assembly claim
    /// and assemble before returning.
    pub async fn submit_chunk(
        &self,
        upload_id: Uuid,
        index: u64,
        bytes: &[u8],
    ) -> Result<ChunkOutcome, UploadError> {
        let session = self.lookup(upload_id).await?;

        let claim;
        let mut outcome;
        {
            let mut guard = session.lock().await;
            if !guard.status.accepts_chunks() {
                return Err(UploadError::InvalidState { status: guard.status });
            }
            if index >= guard.total_chunks {
                return Err(UploadError::OutOfRange { index, total: guard.total_chunks });
            }
            let expected = guard.expected_chunk_len(index);
            if bytes.len() as u64 != expected {
                return Err(UploadError::ChunkSizeMismatch { expected, got: bytes.len() as u64 });
            }

            // Overwrite-safe: a re-submitted index replaces the stored
            // bytes while mark_received leaves the count unchanged.
            self.store.put(&store::chunk_key(upload_id, index), bytes).await?;
            guard.mark_received(index);
            claim = guard.try_claim_assembly();

            let snapshot = guard.snapshot();
            outcome = ChunkOutcome {
                upload_id,
                chunk_index: index,
                progress: snapshot.progress,
                received_count: snapshot.received_chunks,
                total_chunks: snapshot.total_chunks,
                is_complete: guard.is_complete(),
                status: guard.status,
            };
            self.rooms.record_snapshot(snapshot).await;
            self.rooms
                .emit(
                    upload_id,
                    RoomEvent::Progress {
                        progress: outcome.progress,
                        received_chunks: outcome.received_count,
                        total_chunks: outcome.total_chunks,
                    },
                )
                .await;
        }

        if claim {
            self.run_assembly(upload_id, &session).await;
            outcome.status = session.lock().await.status;
        }

        Ok(outcome)
    }

    async fn run_assembly(&self, upload_id: Uuid, session: &Arc<Mutex<UploadSession>>) {
        match assembler::assemble(&self.store, session).await {
            Ok(output) => {
                let snapshot = session.lock().await.snapshot();
                self.rooms.record_snapshot(snapshot).await;
                self.rooms
                    .emit(
                        upload_id,
                        RoomEvent::Complete {
                            file_name: output.file_name.clone(),
                            file_size: output.byte_len,
                            upload_time_ms: output.upload_time_ms,
                            path: output.locator.clone(),
                        },
                    )
                    .await;
                info!(
                    upload_id = %upload_id,
                    byte_len = output.byte_len,
                    upload_time_ms = output.upload_time_ms,
                    "upload assembled"
                );
                self.start_processing(upload_id, Arc::clone(session), output).await;
            }
            Err(err) => {
                match &err {
                    UploadError::CorruptSession { missing, .. } => error!(
                        upload_id = %upload_id,
                        missing_chunk = missing,
                        "invariant violation: ledger complete but chunk blob missing"
                    ),
                    other => error!(upload_id = %upload_id, error = %other, "assembly failed"),
                }
                fail_session(&self.rooms, upload_id, session, err.to_string()).await;
            }
        }
    }

    /// Hand the assembled file to the media pipeline. The relay task is
    /// bounded by the processing semaphore and tracked so cancellation
    /// can abort it.
    async fn start_processing(
        &self,
        upload_id: Uuid,
        session: Arc<Mutex<UploadSession>>,
        output: AssembledOutput,
    ) {
        {
            let mut guard = session.lock().await;
            guard.status = UploadStatus::Processing;
            guard.touch();
            self.rooms.record_snapshot(guard.snapshot()).await;
        }
        self.rooms
            .emit(upload_id, RoomEvent::ProcessingStart { file_name: output.file_name.clone() })
            .await;

        let job = ProcessingJob {
            upload_id,
            file_name: output.file_name,
            mime_type: output.mime_type,
            source: output.locator,
            byte_len: output.byte_len,
        };

        let rooms = Arc::clone(&self.rooms);
        let pipeline = Arc::clone(&self.pipeline);
        let slots = Arc::clone(&self.processing_slots);
        let tasks = Arc::clone(&self.processing_tasks);
        let handle = tokio::spawn(async move {
            let Ok(_permit) = slots.acquire_owned().await else {
                return;
            };

            let mut events = pipeline.process(job);
            while let Some(event) = events.recv().await {
                match event {
                    PipelineEvent::Step { step, percent } => {
                        rooms
                            .emit(upload_id, RoomEvent::ProcessingUpdate { step, progress: percent })
                            .await;
                    }
                    PipelineEvent::Completed(result) => {
                        {
                            let mut guard = session.lock().await;
                            guard.status = UploadStatus::Completed;
                            guard.touch();
                            rooms.record_snapshot(guard.snapshot()).await;
                        }
                        rooms.emit(upload_id, RoomEvent::ProcessingComplete { result }).await;
                        info!(upload_id = %upload_id, "processing completed");
                        break;
                    }
                    PipelineEvent::Failed(reason) => {
                        warn!(upload_id = %upload_id, reason = %reason, "processing failed");
                        fail_session(&rooms, upload_id, &session, reason).await;
                        break;
                    }
                }
            }

            tasks.lock().await.remove(&upload_id);
        });
        self.processing_tasks.lock().await.insert(upload_id, handle);
    }

    /// Latest state of one session.
    pub async fn session_info(&self, upload_id: Uuid) -> Result<SessionSnapshot, UploadError> {
        let session = self.lookup(upload_id).await?;
        let guard = session.lock().await;
        Ok(guard.snapshot())
    }

    /// Summaries of every live session.
    pub async fn active_sessions(&self) -> Vec<SessionSummary> {
        let sessions: Vec<Arc<Mutex<UploadSession>>> =
            self.sessions.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions {
            summaries.push(session.lock().await.summary());
        }
        summaries
    }

    /// Transition a non-terminal session to `Cancelled` and release its
    /// storage. Idempotent; succeeds for unknown ids without creating
    /// anything.
    pub async fn cancel(&self, upload_id: Uuid) {
        let Some(session) = self.sessions.read().await.get(&upload_id).cloned() else {
            return;
        };

        let file_name = {
            let mut guard = session.lock().await;
            if guard.status.is_terminal() {
                return;
            }
            guard.status = UploadStatus::Cancelled;
            guard.assembled_path = None;
            guard.touch();
            self.rooms.record_snapshot(guard.snapshot()).await;
            guard.file_name.clone()
        };

        self.abort_processing(upload_id).await;
        self.release_blobs(upload_id, &file_name).await;
        info!(upload_id = %upload_id, "upload cancelled");
    }

    /// Remove the session record entirely and release its storage.
    /// Usable after `Completed`; always succeeds.
    pub async fn cleanup(&self, upload_id: Uuid) {
        let removed = self.sessions.write().await.remove(&upload_id);
        self.abort_processing(upload_id).await;

        if let Some(session) = removed {
            let file_name = {
                let mut guard = session.lock().await;
                if !guard.status.is_terminal() {
                    guard.status = UploadStatus::Cancelled;
                }
                guard.assembled_path = None;
                guard.touch();
                guard.file_name.clone()
            };
            self.release_blobs(upload_id, &file_name).await;
            info!(upload_id = %upload_id, "upload cleaned up");
        }

        self.rooms.forget_upload(upload_id).await;
    }

    /// Drop terminal sessions whose last activity is older than
    /// `max_age`, releasing their storage. Live sessions are never
    /// touched. Returns how many were swept.
    pub async fn sweep_terminal_sessions(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::days(7));
        let now = Utc::now();

        let candidates: Vec<(Uuid, Arc<Mutex<UploadSession>>)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, session)| (*id, Arc::clone(session)))
            .collect();

        let mut swept = 0;
        for (upload_id, session) in candidates {
            let stale = {
                let guard = session.lock().await;
                guard.status.is_terminal() && now - guard.updated_at > max_age
            };
            if stale {
                self.cleanup(upload_id).await;
                swept += 1;
            }
        }
        swept
    }

    /// Await the processing relay task for an upload, if one is running.
    /// Lets callers (and tests) observe the terminal state
    /// deterministically instead of polling.
    pub async fn await_processing(&self, upload_id: Uuid) {
        let handle = self.processing_tasks.lock().await.remove(&upload_id);
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn abort_processing(&self, upload_id: Uuid) {
        if let Some(handle) = self.processing_tasks.lock().await.remove(&upload_id) {
            handle.abort();
        }
    }

    async fn release_blobs(&self, upload_id: Uuid, file_name: &str) {
        if let Err(err) = self.store.delete_prefix(&store::chunk_prefix(upload_id)).await {
            warn!(upload_id = %upload_id, error = %err, "failed to release chunk blobs");
        }
        if let Err(err) = self.store.delete(&store::assembled_key(upload_id, file_name)).await {
            warn!(upload_id = %upload_id, error = %err, "failed to release assembled blob");
        }
    }

    async fn lookup(&self, upload_id: Uuid) -> Result<Arc<Mutex<UploadSession>>, UploadError> {
        self.sessions
            .read()
            .await
            .get(&upload_id)
            .cloned()
            .ok_or(UploadError::NotFound(upload_id))
    }
}

/// Mark a session `Failed` and broadcast the reason. The assembled blob
/// (if any) is retained in the store for diagnostics, but the session no
/// longer advertises a path.
async fn fail_session(
    rooms: &RoomRegistry,
    upload_id: Uuid,
    session: &Mutex<UploadSession>,
    reason: String,
) {
    {
        let mut guard = session.lock().await;
        guard.status = UploadStatus::Failed;
        guard.assembled_path = None;
        guard.touch();
        rooms.record_snapshot(guard.snapshot()).await;
    }
    rooms.emit(upload_id, RoomEvent::Error { error: reason }).await;
}
