//! Session lifecycle
//!
//! Everything between an authenticated session channel and the child
//! process: spawning, the stream copies, the audit trail and the
//! transcript.

mod audit;
mod client;
mod fanout;
mod orchestrator;
mod registry;
mod resize;
mod spawn;

#[cfg(test)]
pub(crate) mod testing;

pub use audit::{AuditRecorder, SessionStopGuard};
pub use client::{ClientChannel, OutputStream};
pub use fanout::{transcript_relay, Fanout, TranscriptRelay};
pub use orchestrator::{
    ConnectionContext, SessionIo, SessionOrchestrator, SessionRequest, SessionSummary,
};
pub use registry::{SessionInfo, SessionLease, SessionRegistry};
pub use resize::spawn_resize_watcher;
pub use spawn::NativeSpawner;
