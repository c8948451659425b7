//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use uuid::Uuid;

use crate::time::utc_timestamp;

/// Unique identifier for one shell session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Draw a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// The OS account a session executes as.
///
/// Resolved once per connection from the identity directory and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Login name
    pub username: String,
    /// Numeric user id
    pub uid: u32,
    /// Numeric primary group id
    pub gid: u32,
    /// Home directory, also the session working directory
    pub home_dir: PathBuf,
    /// Login shell
    pub shell: PathBuf,
}

/// Terminal dimensions as reported by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    /// Columns
    pub cols: u16,
    /// Rows
    pub rows: u16,
    /// Width in pixels (0 if unknown)
    pub pixel_width: u16,
    /// Height in pixels (0 if unknown)
    pub pixel_height: u16,
}

impl WindowSize {
    /// Build from the 32-bit values carried on the wire, saturating at `u16::MAX`
    pub fn from_wire(cols: u32, rows: u32, pixel_width: u32, pixel_height: u32) -> Self {
        let clamp = |v: u32| u16::try_from(v).unwrap_or(u16::MAX);
        Self {
            cols: clamp(cols),
            rows: clamp(rows),
            pixel_width: clamp(pixel_width),
            pixel_height: clamp(pixel_height),
        }
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

/// A client's request for a pseudo-terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    /// Value for `TERM`
    pub term: String,
    /// Initial window size
    pub size: WindowSize,
}

/// Kinds of audit event a session can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    /// The principal authenticated and the session began setup
    Auth,
    /// An interactive shell started
    SessionStart,
    /// An interactive shell ended
    SessionStop,
    /// A one-shot command was run
    Exec,
    /// A one-shot `scp` transfer was run
    Scp,
    /// The client changed the terminal size
    Resize,
}

impl AuditEventKind {
    /// Wire name of the event kind
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventKind::Auth => "auth",
            AuditEventKind::SessionStart => "session_start",
            AuditEventKind::SessionStop => "session_stop",
            AuditEventKind::Exec => "exec",
            AuditEventKind::Scp => "scp",
            AuditEventKind::Resize => "resize",
        }
    }

    /// Classify an explicit client command
    pub fn for_command(command: &str) -> Self {
        if command.starts_with("scp") {
            AuditEventKind::Scp
        } else {
            AuditEventKind::Exec
        }
    }
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the structured audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Raw command text supplied by the client (empty for interactive shells)
    pub event: String,
    /// What happened
    pub event_type: AuditEventKind,
    /// Session the event belongs to
    pub session_id: SessionId,
    /// Authenticated principal
    pub user: String,
    /// Account the session runs as
    pub login: String,
    /// UTC timestamp, RFC 3339
    pub datetime: String,
    /// Remote peer address
    pub ip_address: String,
}

impl AuditEvent {
    /// Stamp a new event with the current time
    pub fn new(
        kind: AuditEventKind,
        session_id: SessionId,
        username: &str,
        command: &str,
        remote_addr: SocketAddr,
    ) -> Self {
        Self {
            event: command.to_string(),
            event_type: kind,
            session_id,
            user: username.to_string(),
            login: username.to_string(),
            datetime: utc_timestamp(),
            ip_address: remote_addr.to_string(),
        }
    }
}
