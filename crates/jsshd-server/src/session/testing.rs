//! In-memory doubles for session tests

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use jsshd_core::error::SessionError;
use jsshd_core::traits::{
    ChildProcess, LogManager, LogWriter, ProcessExit, ProcessSpawner, SpawnRequest,
    SpawnedProcess, TerminalControl,
};
use jsshd_core::{SessionId, WindowSize};

use super::client::{ClientChannel, OutputStream};

#[derive(Debug, Default)]
struct BufferState {
    data: Vec<u8>,
    closed: bool,
}

/// A log sink whose contents can be inspected after the fact
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    state: Arc<Mutex<BufferState>>,
    failing: bool,
}

impl SharedBuffer {
    /// A sink on which every write fails
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn writer(&self) -> LogWriter {
        Box::new(BufferWriter(self.clone()))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().unwrap().data).into_owned()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

struct BufferWriter(SharedBuffer);

impl AsyncWrite for BufferWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.0.failing {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "disk full")));
        }
        self.0.state.lock().unwrap().data.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.0.state.lock().unwrap().closed = true;
        Poll::Ready(Ok(()))
    }
}

/// Log manager handing out one pair of shared buffers
#[derive(Debug, Clone, Default)]
pub struct MemoryLogManager {
    pub events: SharedBuffer,
    pub transcript: SharedBuffer,
    pub fail_event_log: bool,
    pub fail_session_log: bool,
}

#[async_trait]
impl LogManager for MemoryLogManager {
    async fn event_log(&self, _session_id: &SessionId) -> io::Result<LogWriter> {
        if self.fail_event_log {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        Ok(self.events.writer())
    }

    async fn session_log(&self, _session_id: &SessionId) -> io::Result<LogWriter> {
        if self.fail_session_log {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        Ok(self.transcript.writer())
    }
}

#[derive(Debug, Default)]
struct ClientState {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_status: Option<u32>,
}

/// Client channel collecting everything sent to it
#[derive(Debug, Default)]
pub struct MemoryClient {
    state: Mutex<ClientState>,
    disconnected: bool,
}

impl MemoryClient {
    /// A client whose channel is already gone
    pub fn disconnected() -> Self {
        Self {
            disconnected: true,
            ..Self::default()
        }
    }

    pub fn stdout(&self) -> Vec<u8> {
        self.state.lock().unwrap().stdout.clone()
    }

    pub fn stderr(&self) -> Vec<u8> {
        self.state.lock().unwrap().stderr.clone()
    }

    pub fn exit_status(&self) -> Option<u32> {
        self.state.lock().unwrap().exit_status
    }
}

#[async_trait]
impl ClientChannel for MemoryClient {
    async fn send(&self, stream: OutputStream, data: &[u8]) -> io::Result<()> {
        if self.disconnected {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "channel closed"));
        }
        let mut state = self.state.lock().unwrap();
        match stream {
            OutputStream::Stdout => state.stdout.extend_from_slice(data),
            OutputStream::Stderr => state.stderr.extend_from_slice(data),
        }
        Ok(())
    }

    async fn exit(&self, status: u32) -> io::Result<()> {
        self.state.lock().unwrap().exit_status = Some(status);
        Ok(())
    }
}

/// Terminal remembering every size applied to it
#[derive(Debug, Clone, Default)]
pub struct RecordingTerminal {
    sizes: Arc<Mutex<Vec<WindowSize>>>,
    failing: bool,
}

impl RecordingTerminal {
    /// A terminal on which every resize fails
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn sizes(&self) -> Vec<WindowSize> {
        self.sizes.lock().unwrap().clone()
    }
}

impl TerminalControl for RecordingTerminal {
    fn resize(&self, size: WindowSize) -> Result<(), SessionError> {
        if self.failing {
            return Err(SessionError::Resize("Bad file descriptor".to_string()));
        }
        self.sizes.lock().unwrap().push(size);
        Ok(())
    }
}

/// How a fake child behaves once started
#[derive(Debug, Clone, Default)]
pub struct FakeBehavior {
    /// Written to stdout first
    pub stdout: Vec<u8>,
    /// Written to stderr (pipe mode only)
    pub stderr: Vec<u8>,
    /// Copy stdin to stdout until stdin closes
    pub echo_stdin: bool,
    /// Keep running until killed
    pub run_until_killed: bool,
    /// Exit code reported on a normal exit
    pub exit_code: i32,
}

/// Spawner running an in-process stand-in for the child
#[derive(Debug, Clone, Default)]
pub struct FakeSpawner {
    pub behavior: FakeBehavior,
    pub terminal: RecordingTerminal,
    pub fail: bool,
    requests: Arc<Mutex<Vec<SpawnRequest>>>,
}

impl FakeSpawner {
    pub fn with_behavior(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    /// Spawner whose every spawn fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<SpawnRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ProcessSpawner for FakeSpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedProcess, SessionError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(SessionError::Spawn {
                program: request.program.display().to_string(),
                reason: "No such file or directory".to_string(),
            });
        }

        let (stdin, mut child_stdin) = tokio::io::duplex(1024);
        let (stdout, mut child_stdout) = tokio::io::duplex(1024);
        let (stderr, mut child_stderr) = tokio::io::duplex(1024);
        let (done_tx, done_rx) = oneshot::channel();
        let killed = CancellationToken::new();

        let behavior = self.behavior.clone();
        let pty = request.is_pty();
        let kill_signal = killed.clone();
        tokio::spawn(async move {
            let _ = child_stdout.write_all(&behavior.stdout).await;
            if pty {
                let _ = child_stdout.write_all(&behavior.stderr).await;
            } else {
                let _ = child_stderr.write_all(&behavior.stderr).await;
            }
            drop(child_stderr);

            let code = tokio::select! {
                _ = kill_signal.cancelled() => None,
                _ = async {
                    if behavior.echo_stdin {
                        let _ = tokio::io::copy(&mut child_stdin, &mut child_stdout).await;
                    }
                    if behavior.run_until_killed {
                        std::future::pending::<()>().await;
                    }
                } => Some(behavior.exit_code),
            };
            drop(child_stdout);
            let _ = done_tx.send(code);
        });

        Ok(SpawnedProcess {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: if pty { None } else { Some(Box::new(stderr)) },
            terminal: if pty {
                Some(Box::new(self.terminal.clone()))
            } else {
                None
            },
            child: Box::new(FakeChild {
                done: done_rx,
                killed,
            }),
        })
    }
}

struct FakeChild {
    done: oneshot::Receiver<Option<i32>>,
    killed: CancellationToken,
}

#[async_trait]
impl ChildProcess for FakeChild {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn kill(&mut self) -> io::Result<()> {
        self.killed.cancel();
        Ok(())
    }

    async fn wait(self: Box<Self>) -> io::Result<ProcessExit> {
        match self.done.await {
            Ok(Some(code)) => Ok(ProcessExit {
                code: Some(code),
                signal: None,
            }),
            _ => Ok(ProcessExit {
                code: None,
                signal: Some(9),
            }),
        }
    }
}
