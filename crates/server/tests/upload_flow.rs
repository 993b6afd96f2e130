// End-to-end exercises of the upload lifecycle against the in-memory
// blob store: status transitions, assembly ordering, idempotence, the
// concurrent-completion claim, cancellation, and the sweeper.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use uplink_common::protocol::ws::WsMessage;
use uplink_common::types::UploadStatus;
use uplink_server::processing::{MediaPipeline, PipelineEvent, ScriptedPipeline};
use uplink_server::rooms::RoomRegistry;
use uplink_server::store::{self, BlobStore, MemoryBlobStore};
use uplink_server::upload::{UploadError, UploadLimits, UploadManager};

struct Harness {
    store: Arc<BlobStore>,
    rooms: Arc<RoomRegistry>,
    manager: Arc<UploadManager>,
}

fn harness(pipeline: MediaPipeline) -> Harness {
    let store = Arc::new(BlobStore::Memory(MemoryBlobStore::default()));
    let rooms = Arc::new(RoomRegistry::default());
    let manager = Arc::new(UploadManager::new(
        Arc::clone(&store),
        Arc::clone(&rooms),
        pipeline,
        UploadLimits::default(),
        2,
    ));
    Harness { store, rooms, manager }
}

fn succeeding() -> MediaPipeline {
    MediaPipeline::Scripted(ScriptedPipeline::succeeding())
}

async fn subscriber(h: &Harness, upload_id: Uuid) -> mpsc::UnboundedReceiver<WsMessage> {
    let (tx, rx) = mpsc::unbounded_channel();
    let connection_id = Uuid::new_v4();
    h.rooms.register(connection_id, tx).await;
    assert!(h.rooms.join(connection_id, upload_id).await);
    rx
}

#[tokio::test]
async fn in_order_upload_walks_the_status_machine() {
    let h = harness(succeeding());
    let init = h
        .manager
        .initialize("video.mp4", 2_500_000, 1_000_000, "video/mp4")
        .await
        .expect("initialize succeeds");
    assert_eq!(init.total_chunks, 3);

    let info = h.manager.session_info(init.upload_id).await.unwrap();
    assert_eq!(info.status, UploadStatus::Initialized);

    let outcome = h
        .manager
        .submit_chunk(init.upload_id, 0, &vec![b'a'; 1_000_000])
        .await
        .expect("chunk 0 lands");
    assert_eq!(outcome.progress, 33);
    assert_eq!(outcome.status, UploadStatus::Uploading);
    assert!(!outcome.is_complete);

    let outcome = h
        .manager
        .submit_chunk(init.upload_id, 1, &vec![b'b'; 1_000_000])
        .await
        .expect("chunk 1 lands");
    assert_eq!(outcome.progress, 67);

    let outcome = h
        .manager
        .submit_chunk(init.upload_id, 2, &vec![b'c'; 500_000])
        .await
        .expect("final chunk lands and assembles");
    assert!(outcome.is_complete);
    assert_eq!(outcome.progress, 100);

    h.manager.await_processing(init.upload_id).await;

    let info = h.manager.session_info(init.upload_id).await.unwrap();
    assert_eq!(info.status, UploadStatus::Completed);
    assert!(info.assembled_at.is_some());
    assert!(info.assembled_path.is_some());

    let assembled = h
        .store
        .get(&store::assembled_key(init.upload_id, "video.mp4"))
        .await
        .unwrap()
        .expect("assembled blob exists");
    assert_eq!(assembled.len(), 2_500_000);

    // chunk blobs are gone
    for index in 0..3 {
        assert_eq!(h.store.get(&store::chunk_key(init.upload_id, index)).await.unwrap(), None);
    }
}

#[tokio::test]
async fn out_of_order_upload_is_byte_identical_to_in_order() {
    let h = harness(succeeding());

    let mut assembled = Vec::new();
    for order in [&[0u64, 1, 2][..], &[2u64, 0, 1][..]] {
        let init = h
            .manager
            .initialize("data.bin", 10, 4, "application/octet-stream")
            .await
            .expect("initialize succeeds");
        for &index in order {
            let len = if index == 2 { 2 } else { 4 };
            let bytes = vec![b'0' + index as u8; len];
            h.manager.submit_chunk(init.upload_id, index, &bytes).await.expect("chunk lands");
        }
        h.manager.await_processing(init.upload_id).await;
        let blob = h
            .store
            .get(&store::assembled_key(init.upload_id, "data.bin"))
            .await
            .unwrap()
            .expect("assembled blob exists");
        assembled.push(blob);
    }

    assert_eq!(assembled[0], assembled[1]);
    assert_eq!(assembled[0], b"0000111122".to_vec());
}

#[tokio::test]
async fn duplicate_chunk_keeps_count_but_takes_latest_bytes() {
    let h = harness(succeeding());
    let init = h
        .manager
        .initialize("two.bin", 8, 4, "application/octet-stream")
        .await
        .expect("initialize succeeds");

    let first = h.manager.submit_chunk(init.upload_id, 0, b"aaaa").await.unwrap();
    assert_eq!(first.received_count, 1);
    assert_eq!(first.progress, 50);

    let again = h.manager.submit_chunk(init.upload_id, 0, b"zzzz").await.unwrap();
    assert_eq!(again.received_count, 1, "re-submission must not double-count");
    assert_eq!(again.progress, 50);

    h.manager.submit_chunk(init.upload_id, 1, b"bbbb").await.unwrap();
    h.manager.await_processing(init.upload_id).await;

    let assembled = h
        .store
        .get(&store::assembled_key(init.upload_id, "two.bin"))
        .await
        .unwrap()
        .expect("assembled blob exists");
    assert_eq!(assembled, b"zzzzbbbb".to_vec(), "stored bytes reflect the latest submission");
}

#[tokio::test]
async fn concurrent_last_two_chunks_assemble_exactly_once() {
    for _ in 0..10 {
        let h = harness(succeeding());
        let init = h
            .manager
            .initialize("race.bin", 4, 1, "application/octet-stream")
            .await
            .expect("initialize succeeds");
        h.manager.submit_chunk(init.upload_id, 0, b"w").await.unwrap();
        h.manager.submit_chunk(init.upload_id, 1, b"x").await.unwrap();

        let m1 = Arc::clone(&h.manager);
        let m2 = Arc::clone(&h.manager);
        let id = init.upload_id;
        let (a, b) = tokio::join!(
            tokio::spawn(async move { m1.submit_chunk(id, 2, b"y").await }),
            tokio::spawn(async move { m2.submit_chunk(id, 3, b"z").await }),
        );
        let a = a.expect("task joins").expect("chunk 2 lands");
        let b = b.expect("task joins").expect("chunk 3 lands");

        let completions = [a.is_complete, b.is_complete].iter().filter(|c| **c).count();
        assert_eq!(completions, 1, "exactly one submission observes the completed ledger");

        h.manager.await_processing(id).await;
        let info = h.manager.session_info(id).await.unwrap();
        assert_eq!(info.status, UploadStatus::Completed);

        let assembled = h
            .store
            .get(&store::assembled_key(id, "race.bin"))
            .await
            .unwrap()
            .expect("assembled blob exists");
        assert_eq!(assembled, b"wxyz".to_vec(), "assembled exactly once, in index order");
    }
}

#[tokio::test]
async fn terminal_sessions_reject_further_chunks() {
    let h = harness(succeeding());

    // cancelled session
    let init = h
        .manager
        .initialize("gone.bin", 8, 4, "application/octet-stream")
        .await
        .unwrap();
    h.manager.submit_chunk(init.upload_id, 0, b"aaaa").await.unwrap();
    h.manager.cancel(init.upload_id).await;
    assert!(matches!(
        h.manager.submit_chunk(init.upload_id, 1, b"bbbb").await,
        Err(UploadError::InvalidState { status: UploadStatus::Cancelled })
    ));

    // completed session
    let init = h
        .manager
        .initialize("done.bin", 4, 4, "application/octet-stream")
        .await
        .unwrap();
    h.manager.submit_chunk(init.upload_id, 0, b"abcd").await.unwrap();
    h.manager.await_processing(init.upload_id).await;
    assert!(matches!(
        h.manager.submit_chunk(init.upload_id, 0, b"abcd").await,
        Err(UploadError::InvalidState { status: UploadStatus::Completed })
    ));
}

#[tokio::test]
async fn malformed_submissions_are_rejected() {
    let h = harness(succeeding());
    let init = h
        .manager
        .initialize("strict.bin", 10, 4, "application/octet-stream")
        .await
        .unwrap();

    assert!(matches!(
        h.manager.submit_chunk(init.upload_id, 3, b"xxxx").await,
        Err(UploadError::OutOfRange { index: 3, total: 3 })
    ));
    assert!(matches!(
        h.manager.submit_chunk(init.upload_id, 0, b"toolong").await,
        Err(UploadError::ChunkSizeMismatch { expected: 4, got: 7 })
    ));
    // last chunk carries the remainder (2 bytes)
    assert!(matches!(
        h.manager.submit_chunk(init.upload_id, 2, b"xxxx").await,
        Err(UploadError::ChunkSizeMismatch { expected: 2, got: 4 })
    ));
}

#[tokio::test]
async fn cancel_releases_storage_and_cleanup_removes_the_record() {
    let h = harness(succeeding());
    let init = h
        .manager
        .initialize("partial.bin", 12, 4, "application/octet-stream")
        .await
        .unwrap();
    h.manager.submit_chunk(init.upload_id, 0, b"aaaa").await.unwrap();
    h.manager.submit_chunk(init.upload_id, 1, b"bbbb").await.unwrap();

    h.manager.cancel(init.upload_id).await;
    assert_eq!(h.store.get(&store::chunk_key(init.upload_id, 0)).await.unwrap(), None);
    assert_eq!(h.store.get(&store::chunk_key(init.upload_id, 1)).await.unwrap(), None);

    // record is retained with terminal status; cancelling again is a no-op
    let info = h.manager.session_info(init.upload_id).await.unwrap();
    assert_eq!(info.status, UploadStatus::Cancelled);
    assert!(info.assembled_path.is_none());
    h.manager.cancel(init.upload_id).await;

    h.manager.cleanup(init.upload_id).await;
    assert!(matches!(
        h.manager.session_info(init.upload_id).await,
        Err(UploadError::NotFound(_))
    ));
    assert!(h.rooms.status(init.upload_id).await.is_none());
    assert!(h.manager.active_sessions().await.is_empty());
}

#[tokio::test]
async fn late_subscriber_sees_snapshot_not_a_replay() {
    let h = harness(succeeding());
    let init = h
        .manager
        .initialize("late.bin", 12, 4, "application/octet-stream")
        .await
        .unwrap();

    // two progress events fire before anyone subscribes
    h.manager.submit_chunk(init.upload_id, 0, b"aaaa").await.unwrap();
    h.manager.submit_chunk(init.upload_id, 1, b"bbbb").await.unwrap();

    let mut rx = subscriber(&h, init.upload_id).await;
    assert!(rx.try_recv().is_err(), "joining must not replay missed events");

    let snapshot = h.rooms.status(init.upload_id).await.expect("snapshot recorded");
    assert_eq!(snapshot.received_chunks, 2);
    assert_eq!(snapshot.progress, 67);

    // the next event is live, not history
    h.manager.submit_chunk(init.upload_id, 2, b"cccc").await.unwrap();
    match rx.recv().await.expect("live event arrives") {
        WsMessage::UploadProgress { received_chunks, progress, .. } => {
            assert_eq!(received_chunks, 3);
            assert_eq!(progress, 100);
        }
        other => panic!("expected live progress event, got {other:?}"),
    }
}

#[tokio::test]
async fn subscriber_observes_the_full_event_sequence() {
    let h = harness(succeeding());
    let init = h
        .manager
        .initialize("seq.bin", 8, 4, "application/octet-stream")
        .await
        .unwrap();
    let mut rx = subscriber(&h, init.upload_id).await;

    h.manager.submit_chunk(init.upload_id, 0, b"aaaa").await.unwrap();
    h.manager.submit_chunk(init.upload_id, 1, b"bbbb").await.unwrap();
    h.manager.await_processing(init.upload_id).await;

    let mut events = Vec::new();
    while let Ok(message) = rx.try_recv() {
        events.push(message);
    }

    assert!(matches!(events[0], WsMessage::UploadProgress { received_chunks: 1, .. }));
    assert!(matches!(events[1], WsMessage::UploadProgress { received_chunks: 2, .. }));
    assert!(matches!(events[2], WsMessage::UploadComplete { file_size: 8, .. }));
    assert!(matches!(events[3], WsMessage::ProcessingStart { .. }));
    assert!(matches!(events.last(), Some(WsMessage::ProcessingComplete { .. })));
}

#[tokio::test]
async fn pipeline_failure_marks_failed_and_keeps_the_assembled_file() {
    let h = harness(MediaPipeline::Scripted(ScriptedPipeline::failing("no decoder")));
    let init = h
        .manager
        .initialize("bad.mp4", 4, 4, "video/mp4")
        .await
        .unwrap();
    let mut rx = subscriber(&h, init.upload_id).await;

    h.manager.submit_chunk(init.upload_id, 0, b"abcd").await.unwrap();
    h.manager.await_processing(init.upload_id).await;

    let info = h.manager.session_info(init.upload_id).await.unwrap();
    assert_eq!(info.status, UploadStatus::Failed);
    assert!(info.assembled_path.is_none(), "a failed session advertises no path");

    // assembled blob retained for diagnostics
    let assembled = h
        .store
        .get(&store::assembled_key(init.upload_id, "bad.mp4"))
        .await
        .unwrap();
    assert!(assembled.is_some());

    let mut saw_error = false;
    while let Ok(message) = rx.try_recv() {
        if let WsMessage::UploadError { error, .. } = message {
            assert!(error.contains("no decoder"));
            saw_error = true;
        }
    }
    assert!(saw_error, "failure must be broadcast to the room");
}

#[tokio::test]
async fn cancel_mid_processing_stops_event_emission() {
    // a script without a terminal event pins the relay task at recv
    let h = harness(MediaPipeline::Scripted(ScriptedPipeline::new(vec![PipelineEvent::Step {
        step: "transcode preview".to_string(),
        percent: 50,
    }])));
    let init = h
        .manager
        .initialize("hang.mp4", 4, 4, "video/mp4")
        .await
        .unwrap();
    let mut rx = subscriber(&h, init.upload_id).await;

    h.manager.submit_chunk(init.upload_id, 0, b"abcd").await.unwrap();

    // wait until the relay task is provably mid-stream
    loop {
        match rx.recv().await.expect("event stream open") {
            WsMessage::ProcessingUpdate { progress: 50, .. } => break,
            _ => continue,
        }
    }

    h.manager.cancel(init.upload_id).await;
    h.manager.await_processing(init.upload_id).await;

    let info = h.manager.session_info(init.upload_id).await.unwrap();
    assert_eq!(info.status, UploadStatus::Cancelled);
    assert_eq!(
        h.store.get(&store::assembled_key(init.upload_id, "hang.mp4")).await.unwrap(),
        None,
        "cancel releases the assembled blob"
    );
    assert!(rx.try_recv().is_err(), "no events after cancellation");
}

#[tokio::test]
async fn sweeper_removes_only_stale_terminal_sessions() {
    let h = harness(succeeding());
    let done = h
        .manager
        .initialize("old.bin", 4, 4, "application/octet-stream")
        .await
        .unwrap();
    h.manager.cancel(done.upload_id).await;

    let live = h
        .manager
        .initialize("live.bin", 8, 4, "application/octet-stream")
        .await
        .unwrap();
    h.manager.submit_chunk(live.upload_id, 0, b"aaaa").await.unwrap();

    let swept = h.manager.sweep_terminal_sessions(Duration::ZERO).await;
    assert_eq!(swept, 1);

    let remaining = h.manager.active_sessions().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].upload_id, live.upload_id);

    assert_eq!(h.manager.sweep_terminal_sessions(Duration::ZERO).await, 0);
}
