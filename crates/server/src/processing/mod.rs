// Media processing dispatch.
//
// The byte-level transformation itself is an external capability; this
// module defines the contract the core consumes — a cancellable task
// that yields named step events and terminates in a result or a failure
// — plus the built-in recipe that reports per-kind step progress and
// file metadata.

use tokio::sync::mpsc;
use uuid::Uuid;

use uplink_common::types::{MediaKind, ProcessingResult};

/// Work order handed to a pipeline after assembly.
#[derive(Debug, Clone)]
pub struct ProcessingJob {
    pub upload_id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    /// Locator of the assembled blob.
    pub source: String,
    pub byte_len: u64,
}

/// One element of a pipeline's event stream. `Completed` and `Failed`
/// are terminal; nothing follows them.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Step { step: String, percent: u8 },
    Completed(ProcessingResult),
    Failed(String),
}

pub enum MediaPipeline {
    Metadata(MetadataPipeline),
    /// Replays a fixed event sequence; test double.
    Scripted(ScriptedPipeline),
}

impl MediaPipeline {
    /// Start processing and return the event stream. The spawned task is
    /// owned by the caller's receiver: dropping the receiver or aborting
    /// the consuming task cancels processing.
    pub fn process(&self, job: ProcessingJob) -> mpsc::Receiver<PipelineEvent> {
        match self {
            Self::Metadata(pipeline) => pipeline.process(job),
            Self::Scripted(pipeline) => pipeline.process(),
        }
    }
}

/// Built-in recipe: classifies the media kind, walks the kind's step
/// sequence, and reports the assembled file's metadata as the result.
#[derive(Debug, Default)]
pub struct MetadataPipeline;

/// Step sequence per media kind, `(step name, percent)` in emit order.
fn steps_for(kind: MediaKind) -> &'static [(&'static str, u8)] {
    match kind {
        MediaKind::Image => &[
            ("generate thumbnail", 25),
            ("generate medium preview", 50),
            ("optimize original", 75),
            ("finish image pipeline", 100),
        ],
        MediaKind::Video => &[
            ("extract video thumbnail", 20),
            ("transcode preview", 60),
            ("finalize preview", 100),
        ],
        MediaKind::Document => &[("inspect document", 50), ("finish document pipeline", 100)],
        MediaKind::Generic => &[("probe file", 100)],
    }
}

impl MetadataPipeline {
    fn process(&self, job: ProcessingJob) -> mpsc::Receiver<PipelineEvent> {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let kind = MediaKind::from_mime(&job.mime_type);
            for (step, percent) in steps_for(kind) {
                let event = PipelineEvent::Step { step: (*step).to_string(), percent: *percent };
                if tx.send(event).await.is_err() {
                    return; // consumer cancelled
                }
            }
            let result = ProcessingResult { kind, source: job.source, byte_len: job.byte_len };
            let _ = tx.send(PipelineEvent::Completed(result)).await;
        });
        rx
    }
}

/// Emits a canned sequence. A script whose last element is not terminal
/// holds the stream open afterwards, which pins the consuming relay task
/// at `recv` — cancellation paths are exercised against that.
pub struct ScriptedPipeline {
    events: Vec<PipelineEvent>,
}

impl ScriptedPipeline {
    pub fn new(events: Vec<PipelineEvent>) -> Self {
        Self { events }
    }

    /// A pipeline that immediately succeeds with the job's metadata left
    /// blank — enough for flows that only care about the terminal state.
    pub fn succeeding() -> Self {
        Self::new(vec![PipelineEvent::Completed(ProcessingResult {
            kind: MediaKind::Generic,
            source: String::new(),
            byte_len: 0,
        })])
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self::new(vec![PipelineEvent::Failed(reason.into())])
    }

    fn process(&self) -> mpsc::Receiver<PipelineEvent> {
        let (tx, rx) = mpsc::channel(16);
        let events = self.events.clone();
        let hold_open = !matches!(
            events.last(),
            Some(PipelineEvent::Completed(_)) | Some(PipelineEvent::Failed(_))
        );
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            if hold_open {
                // keep the sender alive so the consumer blocks on recv
                std::future::pending::<()>().await;
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(mime: &str) -> ProcessingJob {
        ProcessingJob {
            upload_id: Uuid::new_v4(),
            file_name: "file".to_string(),
            mime_type: mime.to_string(),
            source: "assembled/file".to_string(),
            byte_len: 42,
        }
    }

    async fn drain(mut rx: mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn image_pipeline_walks_all_steps_then_completes() {
        let pipeline = MediaPipeline::Metadata(MetadataPipeline);
        let events = drain(pipeline.process(job("image/png"))).await;

        assert_eq!(events.len(), 5);
        match &events[0] {
            PipelineEvent::Step { step, percent } => {
                assert_eq!(step, "generate thumbnail");
                assert_eq!(*percent, 25);
            }
            other => panic!("expected step, got {other:?}"),
        }
        match events.last() {
            Some(PipelineEvent::Completed(result)) => {
                assert_eq!(result.kind, MediaKind::Image);
                assert_eq!(result.byte_len, 42);
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn generic_pipeline_is_a_single_probe() {
        let pipeline = MediaPipeline::Metadata(MetadataPipeline);
        let events = drain(pipeline.process(job("application/zip"))).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], PipelineEvent::Step { percent: 100, .. }));
    }

    #[tokio::test]
    async fn step_percents_are_monotonic_for_every_kind() {
        for kind in [MediaKind::Image, MediaKind::Video, MediaKind::Document, MediaKind::Generic] {
            let steps = steps_for(kind);
            let mut last = 0;
            for (_, percent) in steps {
                assert!(*percent > last, "{kind:?} steps must increase");
                last = *percent;
            }
            assert_eq!(last, 100, "{kind:?} must end at 100");
        }
    }

    #[tokio::test]
    async fn scripted_pipeline_replays_and_can_fail() {
        let pipeline = MediaPipeline::Scripted(ScriptedPipeline::failing("no decoder"));
        let events = drain(pipeline.process(job("video/mp4"))).await;
        assert_eq!(events, vec![PipelineEvent::Failed("no decoder".to_string())]);
    }
}
