//! Terminal window-change handling

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use jsshd_core::traits::TerminalControl;
use jsshd_core::{AuditEventKind, WindowSize};

use super::audit::AuditRecorder;

/// Apply window changes to `terminal` for the life of a session.
///
/// Every applied change records one `resize` event, in arrival order.
/// Notifications already queued when `cancel` fires are still applied. A
/// failed resize ends the watcher and nothing else.
pub fn spawn_resize_watcher(
    terminal: Box<dyn TerminalControl>,
    mut resizes: mpsc::UnboundedReceiver<WindowSize>,
    audit: AuditRecorder,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let apply = |size: WindowSize| match terminal.resize(size) {
            Ok(()) => {
                tracing::trace!("Window resized to {}x{}", size.cols, size.rows);
                audit.record(AuditEventKind::Resize);
                true
            }
            Err(e) => {
                tracing::error!("{} (session {})", e, audit.session_id());
                false
            }
        };

        loop {
            tokio::select! {
                biased;

                next = resizes.recv() => match next {
                    Some(size) => {
                        if !apply(size) {
                            return;
                        }
                    }
                    None => return,
                },

                _ = cancel.cancelled() => {
                    while let Ok(size) = resizes.try_recv() {
                        if !apply(size) {
                            return;
                        }
                    }
                    return;
                }
            }
        }
    })
}
