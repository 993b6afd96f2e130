// Drains a complete chunk ledger into a single ordered output blob.
//
// Runs after the caller has won the `Uploading -> Assembling` claim, so
// no chunk submission can race it; the session mutex is only taken
// briefly at the start and end.

use chrono::Utc;
use tokio::sync::Mutex;

use crate::store::{self, BlobStore};
use uplink_common::types::UploadStatus;

use super::session::UploadSession;
use super::UploadError;

/// What assembly produced, for the completion event and the processing
/// handoff.
#[derive(Debug, Clone)]
pub(crate) struct AssembledOutput {
    pub locator: String,
    pub byte_len: u64,
    pub file_name: String,
    pub mime_type: String,
    pub upload_time_ms: u64,
}

/// Concatenate chunks `0..total_chunks` in ascending index order into
/// the assembled blob, then delete the per-index chunk blobs.
///
/// A missing chunk despite a complete ledger is a broken invariant:
/// assembly stops with `CorruptSession` and never skips the gap.
pub(crate) async fn assemble(
    store: &BlobStore,
    session: &Mutex<UploadSession>,
) -> Result<AssembledOutput, UploadError> {
    let (id, file_name, mime_type, total_chunks, created_at) = {
        let guard = session.lock().await;
        debug_assert_eq!(guard.status, UploadStatus::Assembling);
        (
            guard.id,
            guard.file_name.clone(),
            guard.mime_type.clone(),
            guard.total_chunks,
            guard.created_at,
        )
    };

    let out_key = store::assembled_key(id, &file_name);
    store.delete(&out_key).await?;

    let mut byte_len: u64 = 0;
    for index in 0..total_chunks {
        let Some(bytes) = store.get(&store::chunk_key(id, index)).await? else {
            // Drop the partial output; the session is beyond repair.
            let _ = store.delete(&out_key).await;
            return Err(UploadError::CorruptSession { id, missing: index });
        };
        store.append(&out_key, &bytes).await?;
        byte_len += bytes.len() as u64;
    }

    store.delete_prefix(&store::chunk_prefix(id)).await?;

    let locator = store.locator(&out_key);
    let assembled_at = Utc::now();
    let upload_time_ms = (assembled_at - created_at).num_milliseconds().max(0) as u64;

    {
        let mut guard = session.lock().await;
        guard.assembled_at = Some(assembled_at);
        guard.assembled_path = Some(locator.clone());
        guard.status = UploadStatus::Assembled;
        guard.touch();
    }

    Ok(AssembledOutput { locator, byte_len, file_name, mime_type, upload_time_ms })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlobStore;

    async fn complete_session(
        store: &BlobStore,
        declared: u64,
        chunk: u64,
        order: &[u64],
    ) -> Mutex<UploadSession> {
        let mut session =
            UploadSession::new("clip.mp4".to_string(), declared, chunk, "video/mp4".to_string());
        for &index in order {
            let len = session.expected_chunk_len(index) as usize;
            let bytes = vec![b'a' + index as u8; len];
            store.put(&store::chunk_key(session.id, index), &bytes).await.unwrap();
            session.mark_received(index);
        }
        assert!(session.try_claim_assembly());
        Mutex::new(session)
    }

    #[tokio::test]
    async fn out_of_order_submission_assembles_in_index_order() {
        let store = BlobStore::Memory(MemoryBlobStore::default());
        let session = complete_session(&store, 10, 4, &[2, 0, 1]).await;

        let output = assemble(&store, &session).await.expect("assembly succeeds");
        assert_eq!(output.byte_len, 10);

        let guard = session.lock().await;
        let assembled = store
            .get(&store::assembled_key(guard.id, "clip.mp4"))
            .await
            .unwrap()
            .expect("assembled blob exists");
        // chunks: 4x'a', 4x'b', 2x'c' — ascending index order regardless
        // of arrival order
        assert_eq!(assembled, b"aaaabbbbcc".to_vec());
        assert_eq!(guard.status, UploadStatus::Assembled);
        assert!(guard.assembled_at.is_some());
        let path = guard.assembled_path.as_deref().expect("assembled path set");
        assert!(path.starts_with("mem://assembled/"));
        assert!(path.ends_with("clip.mp4"));
    }

    #[tokio::test]
    async fn chunks_are_deleted_after_assembly() {
        let store = BlobStore::Memory(MemoryBlobStore::default());
        let session = complete_session(&store, 10, 4, &[0, 1, 2]).await;
        let id = session.lock().await.id;

        assemble(&store, &session).await.expect("assembly succeeds");

        for index in 0..3 {
            assert_eq!(store.get(&store::chunk_key(id, index)).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn missing_chunk_is_fatal_and_never_skipped() {
        let store = BlobStore::Memory(MemoryBlobStore::default());
        let session = complete_session(&store, 10, 4, &[0, 1, 2]).await;
        let id = session.lock().await.id;

        // the ledger says complete, but the blob vanished
        store.delete(&store::chunk_key(id, 1)).await.unwrap();

        let error = assemble(&store, &session).await.expect_err("assembly must fail");
        match error {
            UploadError::CorruptSession { id: got, missing } => {
                assert_eq!(got, id);
                assert_eq!(missing, 1);
            }
            other => panic!("expected CorruptSession, got {other:?}"),
        }

        // no partial output is left behind
        assert_eq!(store.get(&store::assembled_key(id, "clip.mp4")).await.unwrap(), None);
        let guard = session.lock().await;
        assert!(guard.assembled_path.is_none());
    }

    #[tokio::test]
    async fn assembled_byte_length_matches_declared_size() {
        let store = BlobStore::Memory(MemoryBlobStore::default());
        let session = complete_session(&store, 2_500_000, 1_000_000, &[1, 2, 0]).await;

        let output = assemble(&store, &session).await.expect("assembly succeeds");
        assert_eq!(output.byte_len, 2_500_000);
    }
}
