//! Structured audit trail
//!
//! Events are handed to a single writer task per session so they land in
//! the event log in the order they were recorded, without the recording
//! side ever waiting on the sink.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use jsshd_core::traits::LogWriter;
use jsshd_core::{AuditEvent, AuditEventKind, SessionId};

/// Fields shared by every event of one session
#[derive(Debug)]
struct EventTemplate {
    session_id: SessionId,
    username: String,
    command: String,
    remote_addr: SocketAddr,
}

/// Records audit events for one session.
///
/// Cloning is cheap; the writer task finishes once every clone is dropped.
#[derive(Debug, Clone)]
pub struct AuditRecorder {
    template: Arc<EventTemplate>,
    tx: mpsc::UnboundedSender<AuditEvent>,
}

impl AuditRecorder {
    /// Start the event writer for a session.
    ///
    /// `command` is the raw command text attached to every event (empty for
    /// interactive shells).
    pub fn start(
        sink: LogWriter,
        session_id: SessionId,
        username: &str,
        command: &str,
        remote_addr: SocketAddr,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_events(sink, rx));

        let recorder = Self {
            template: Arc::new(EventTemplate {
                session_id,
                username: username.to_string(),
                command: command.to_string(),
                remote_addr,
            }),
            tx,
        };
        (recorder, writer)
    }

    /// Session the events belong to
    pub fn session_id(&self) -> SessionId {
        self.template.session_id
    }

    /// Append one event
    pub fn record(&self, kind: AuditEventKind) {
        let template = &self.template;
        let event = AuditEvent::new(
            kind,
            template.session_id,
            &template.username,
            &template.command,
            template.remote_addr,
        );

        if self.tx.send(event).is_err() {
            tracing::error!(
                "Failed to write audit event {} for session {}: event log closed",
                kind,
                template.session_id
            );
        }
    }

    /// Record `session_start` and return a guard recording `session_stop`
    /// when dropped
    pub fn session_started(&self) -> SessionStopGuard {
        self.record(AuditEventKind::SessionStart);
        SessionStopGuard {
            recorder: self.clone(),
        }
    }
}

/// Emits `session_stop` however the interactive session ends
#[derive(Debug)]
#[must_use = "dropping the guard records session_stop immediately"]
pub struct SessionStopGuard {
    recorder: AuditRecorder,
}

impl Drop for SessionStopGuard {
    fn drop(&mut self) {
        self.recorder.record(AuditEventKind::SessionStop);
    }
}

/// Serialize queued events one per line until every recorder is gone
async fn write_events(mut sink: LogWriter, mut rx: mpsc::UnboundedReceiver<AuditEvent>) {
    while let Some(event) = rx.recv().await {
        let mut line = match serde_json::to_vec(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to marshal audit event: {}", e);
                continue;
            }
        };
        line.push(b'\n');

        if let Err(e) = sink.write_all(&line).await {
            tracing::error!("Failed to write audit event: {}", e);
            continue;
        }
        if let Err(e) = sink.flush().await {
            tracing::error!("Failed to flush audit event: {}", e);
        }
    }

    if let Err(e) = sink.shutdown().await {
        tracing::debug!("Failed to close event log: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::SharedBuffer;

    fn addr() -> SocketAddr {
        "192.0.2.10:40000".parse().unwrap()
    }

    fn events(buffer: &SharedBuffer) -> Vec<AuditEvent> {
        buffer
            .text()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_events_written_in_order() {
        let buffer = SharedBuffer::default();
        let id = SessionId::generate();
        let (audit, writer) = AuditRecorder::start(buffer.writer(), id, "alice", "", addr());

        audit.record(AuditEventKind::Auth);
        audit.record(AuditEventKind::Resize);
        audit.record(AuditEventKind::Resize);
        drop(audit);
        writer.await.unwrap();

        let kinds: Vec<_> = events(&buffer).iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                AuditEventKind::Auth,
                AuditEventKind::Resize,
                AuditEventKind::Resize
            ]
        );
        assert!(buffer.is_closed());
    }

    #[tokio::test]
    async fn test_every_event_carries_session_fields() {
        let buffer = SharedBuffer::default();
        let id = SessionId::generate();
        let (audit, writer) =
            AuditRecorder::start(buffer.writer(), id, "alice", "scp -t /tmp/x", addr());

        audit.record(AuditEventKind::Scp);
        drop(audit);
        writer.await.unwrap();

        let recorded = events(&buffer);
        assert_eq!(recorded.len(), 1);
        let event = &recorded[0];
        assert_eq!(event.event, "scp -t /tmp/x");
        assert_eq!(event.session_id, id);
        assert_eq!(event.user, "alice");
        assert_eq!(event.login, "alice");
        assert_eq!(event.ip_address, "192.0.2.10:40000");
    }

    #[tokio::test]
    async fn test_stop_guard_records_stop_after_start() {
        let buffer = SharedBuffer::default();
        let (audit, writer) =
            AuditRecorder::start(buffer.writer(), SessionId::generate(), "alice", "", addr());

        let guard = audit.session_started();
        audit.record(AuditEventKind::Resize);
        drop(guard);
        drop(audit);
        writer.await.unwrap();

        let kinds: Vec<_> = events(&buffer).iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                AuditEventKind::SessionStart,
                AuditEventKind::Resize,
                AuditEventKind::SessionStop
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_guard_fires_on_early_return() {
        fn failing_setup(audit: &AuditRecorder) -> Result<(), &'static str> {
            let _stop = audit.session_started();
            Err("spawn failed")
        }

        let buffer = SharedBuffer::default();
        let (audit, writer) =
            AuditRecorder::start(buffer.writer(), SessionId::generate(), "alice", "", addr());
        assert!(failing_setup(&audit).is_err());
        drop(audit);
        writer.await.unwrap();

        let kinds: Vec<_> = events(&buffer).iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![AuditEventKind::SessionStart, AuditEventKind::SessionStop]
        );
    }

    #[tokio::test]
    async fn test_sink_failure_is_not_fatal() {
        let buffer = SharedBuffer::failing();
        let (audit, writer) =
            AuditRecorder::start(buffer.writer(), SessionId::generate(), "alice", "", addr());

        audit.record(AuditEventKind::Auth);
        audit.record(AuditEventKind::Exec);
        drop(audit);
        writer.await.unwrap();

        assert!(buffer.text().is_empty());
    }
}
