// WebSocket endpoint: one connection per subscriber, joined to upload
// rooms by request.

mod handler;
mod protocol;

pub use handler::router;

/// Server-initiated ping cadence; a connection is dead once a full
/// interval plus this grace period passes without a pong.
pub(crate) const PING_INTERVAL_MS: u64 = 15_000;
pub(crate) const PONG_TIMEOUT_MS: u64 = 10_000;
/// Control frames only; anything larger is a protocol violation.
pub(crate) const MAX_FRAME_BYTES: usize = 64 * 1024;
