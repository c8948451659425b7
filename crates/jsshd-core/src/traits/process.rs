//! Process spawning traits
//!
//! Sessions never touch the OS process APIs directly; they go through a
//! [`ProcessSpawner`], which is implemented natively per platform.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::SessionError;
use crate::types::{PtyRequest, WindowSize};

/// Writable end feeding the child's standard input.
///
/// `shutdown` only flushes; the child sees EOF once the writer is dropped.
pub type StdinWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Readable end of one of the child's output streams
pub type StdoutReader = Box<dyn AsyncRead + Send + Unpin>;

/// Everything needed to start a session's child process
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Program to run (the identity's shell)
    pub program: PathBuf,
    /// When set, the program is run as `program -c <command>`
    pub command: Option<String>,
    /// Complete environment; later entries override earlier ones
    pub env: Vec<(String, String)>,
    /// Working directory
    pub cwd: PathBuf,
    /// Allocate a pseudo-terminal when set
    pub pty: Option<PtyRequest>,
}

impl SpawnRequest {
    /// Whether the child gets a pseudo-terminal
    pub fn is_pty(&self) -> bool {
        self.pty.is_some()
    }
}

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    /// Terminating signal, if any
    pub signal: Option<i32>,
}

impl ProcessExit {
    /// Normal exit with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A running child process
#[async_trait]
pub trait ChildProcess: Send {
    /// OS process id, if known
    fn pid(&self) -> Option<u32>;

    /// Ask the process to terminate without waiting for it
    fn kill(&mut self) -> std::io::Result<()>;

    /// Wait for the process to exit and release its resources
    async fn wait(self: Box<Self>) -> std::io::Result<ProcessExit>;
}

/// Control over a pseudo-terminal device
pub trait TerminalControl: Send + Sync {
    /// Apply new dimensions to the terminal
    fn resize(&self, size: WindowSize) -> Result<(), SessionError>;
}

/// A spawned child plus its attached streams.
///
/// In PTY mode `stdin` and `stdout` are the two directions of the
/// terminal's single duplex stream and `stderr` is `None`.
pub struct SpawnedProcess {
    /// Child's standard input
    pub stdin: StdinWriter,
    /// Child's standard output (or the combined terminal output)
    pub stdout: StdoutReader,
    /// Child's standard error, pipe mode only
    pub stderr: Option<StdoutReader>,
    /// Terminal device, PTY mode only
    pub terminal: Option<Box<dyn TerminalControl>>,
    /// The process itself
    pub child: Box<dyn ChildProcess>,
}

impl SpawnedProcess {
    /// Whether the process runs on a pseudo-terminal
    pub fn is_pty(&self) -> bool {
        self.terminal.is_some()
    }
}

/// Starts session child processes
pub trait ProcessSpawner: Send + Sync {
    /// Start the child described by `request`.
    ///
    /// The child is placed in a new session so its controlling terminal
    /// and signal delivery are isolated from the daemon.
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedProcess, SessionError>;
}
