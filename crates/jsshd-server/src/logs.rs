//! Log manager implementations
//!
//! The daemon either writes per-session files into a log directory or,
//! with no directory configured, discards audit output entirely.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::OpenOptions;

use jsshd_core::traits::{LogManager, LogWriter};
use jsshd_core::SessionId;

/// File name of a session's structured event log
pub fn event_log_name(session_id: &SessionId) -> String {
    format!("{}-event.log", session_id)
}

/// File name of a session's raw transcript
pub fn session_log_name(session_id: &SessionId) -> String {
    format!("{}-session.log", session_id)
}

/// Writes each sink to its own append-only file
#[derive(Debug, Clone)]
pub struct FileLogManager {
    dir: PathBuf,
}

impl FileLogManager {
    /// Create a manager writing into `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the logs are written to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn open(&self, name: String) -> std::io::Result<LogWriter> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        tracing::debug!("Opening log {:?}", path);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Box::new(file))
    }
}

#[async_trait]
impl LogManager for FileLogManager {
    async fn event_log(&self, session_id: &SessionId) -> std::io::Result<LogWriter> {
        self.open(event_log_name(session_id)).await
    }

    async fn session_log(&self, session_id: &SessionId) -> std::io::Result<LogWriter> {
        self.open(session_log_name(session_id)).await
    }
}

/// Accepts and drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardLogManager;

#[async_trait]
impl LogManager for DiscardLogManager {
    async fn event_log(&self, _session_id: &SessionId) -> std::io::Result<LogWriter> {
        Ok(Box::new(tokio::io::sink()))
    }

    async fn session_log(&self, _session_id: &SessionId) -> std::io::Result<LogWriter> {
        Ok(Box::new(tokio::io::sink()))
    }
}
