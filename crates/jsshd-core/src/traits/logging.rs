//! Log sink traits

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::types::SessionId;

/// A write-and-close handle to one log stream.
///
/// Callers shut the writer down to flush it when finished. The
/// underlying resource is only released when the writer is dropped.
pub type LogWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Creates per-session log sinks.
///
/// Invoked concurrently from every connection.
#[async_trait]
pub trait LogManager: Send + Sync {
    /// Structured, line-delimited audit event sink for a session
    async fn event_log(&self, session_id: &SessionId) -> std::io::Result<LogWriter>;

    /// Raw byte-for-byte transcript sink for a session
    async fn session_log(&self, session_id: &SessionId) -> std::io::Result<LogWriter>;
}
