//! Native process spawning
//!
//! Pseudo-terminal sessions use the portable-pty crate; its blocking
//! reader and writer are bridged onto in-memory async pipes. Plain
//! sessions use piped stdio from `tokio::process`.

use std::io::{Read, Write};
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use portable_pty::{native_pty_system, Child as _, CommandBuilder, MasterPty, PtySize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::io::SyncIoBridge;

use jsshd_core::error::SessionError;
use jsshd_core::traits::{
    ChildProcess, ProcessExit, ProcessSpawner, SpawnRequest, SpawnedProcess, TerminalControl,
};
use jsshd_core::WindowSize;

/// Buffer size of the async pipes in front of the terminal
const PTY_PIPE_SIZE: usize = 8192;

/// Spawns session processes on the local host
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSpawner;

impl NativeSpawner {
    /// Create a new spawner
    pub fn new() -> Self {
        Self
    }

    fn spawn_pty(
        &self,
        request: &SpawnRequest,
        size: WindowSize,
    ) -> Result<SpawnedProcess, SessionError> {
        let pair = native_pty_system()
            .openpty(pty_size(size))
            .map_err(|e| SessionError::PtyAllocation(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&request.program);
        if let Some(command) = &request.command {
            cmd.arg("-c");
            cmd.arg(command);
        }
        cmd.env_clear();
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        cmd.cwd(&request.cwd);

        // portable-pty starts the child as a session leader with the
        // terminal as its controlling tty
        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| spawn_error(request, e))?;
        // The master only sees EOF once no slave handle is left open here
        drop(pair.slave);

        tracing::info!(
            "Spawned {:?} on a pty with PID: {:?}",
            request.program,
            child.process_id()
        );

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SessionError::PtyAllocation(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SessionError::PtyAllocation(e.to_string()))?;

        let (stdout, pty_out) = tokio::io::duplex(PTY_PIPE_SIZE);
        let (stdin, pty_in) = tokio::io::duplex(PTY_PIPE_SIZE);
        tokio::task::spawn_blocking(move || pump_output(reader, pty_out));
        tokio::task::spawn_blocking(move || pump_input(pty_in, writer));

        Ok(SpawnedProcess {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: None,
            terminal: Some(Box::new(PtyTerminal {
                master: Mutex::new(pair.master),
            })),
            child: Box::new(PtyChild { child }),
        })
    }

    fn spawn_piped(&self, request: &SpawnRequest) -> Result<SpawnedProcess, SessionError> {
        let mut cmd = tokio::process::Command::new(&request.program);
        if let Some(command) = &request.command {
            cmd.arg("-c").arg(command);
        }
        cmd.env_clear()
            .envs(request.env.iter().map(|(k, v)| (k, v)))
            .current_dir(&request.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        // SAFETY: setsid is async-signal-safe and touches no parent state
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid()
                    .map(|_| ())
                    .map_err(std::io::Error::from)
            });
        }

        let mut child = cmd.spawn().map_err(|e| spawn_error(request, e))?;
        tracing::info!("Spawned {:?} with PID: {:?}", request.program, child.id());

        let missing = |stream: &str| SessionError::Spawn {
            program: request.program.display().to_string(),
            reason: format!("{} pipe unavailable", stream),
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        Ok(SpawnedProcess {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Some(Box::new(stderr)),
            terminal: None,
            child: Box::new(PipedChild { child }),
        })
    }
}

impl ProcessSpawner for NativeSpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedProcess, SessionError> {
        match &request.pty {
            Some(pty) => self.spawn_pty(request, pty.size),
            None => self.spawn_piped(request),
        }
    }
}

fn spawn_error(request: &SpawnRequest, e: impl std::fmt::Display) -> SessionError {
    SessionError::Spawn {
        program: request.program.display().to_string(),
        reason: e.to_string(),
    }
}

fn pty_size(size: WindowSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: size.pixel_width,
        pixel_height: size.pixel_height,
    }
}

/// Copy terminal output into the async pipe until the terminal closes
fn pump_output<W>(mut reader: Box<dyn Read + Send>, pipe: W)
where
    W: AsyncWrite + Unpin,
{
    let mut pipe = SyncIoBridge::new(pipe);
    let mut buf = [0u8; PTY_PIPE_SIZE];

    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if pipe.write_all(&buf[..n]).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // Linux reports EIO once the last slave handle closes
            Err(e) => {
                tracing::trace!("PTY read ended: {}", e);
                break;
            }
        }
    }

    let _ = pipe.shutdown();
}

/// Copy client input into the terminal until the async pipe closes
fn pump_input<R>(pipe: R, mut writer: Box<dyn Write + Send>)
where
    R: AsyncRead + Unpin,
{
    let mut pipe = SyncIoBridge::new(pipe);
    if let Err(e) = std::io::copy(&mut pipe, &mut writer) {
        tracing::trace!("PTY write ended: {}", e);
    }
}

struct PtyTerminal {
    master: Mutex<Box<dyn MasterPty + Send>>,
}

impl TerminalControl for PtyTerminal {
    fn resize(&self, size: WindowSize) -> Result<(), SessionError> {
        let master = self
            .master
            .lock()
            .map_err(|_| SessionError::Resize("terminal lock poisoned".to_string()))?;
        master
            .resize(pty_size(size))
            .map_err(|e| SessionError::Resize(e.to_string()))
    }
}

struct PtyChild {
    child: Box<dyn portable_pty::Child + Send + Sync>,
}

#[async_trait]
impl ChildProcess for PtyChild {
    fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }

    fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill()
    }

    async fn wait(self: Box<Self>) -> std::io::Result<ProcessExit> {
        let mut child = self.child;
        let status = tokio::task::spawn_blocking(move || child.wait())
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        Ok(ProcessExit {
            code: i32::try_from(status.exit_code()).ok(),
            signal: None,
        })
    }
}

struct PipedChild {
    child: tokio::process::Child,
}

#[async_trait]
impl ChildProcess for PipedChild {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }

    async fn wait(mut self: Box<Self>) -> std::io::Result<ProcessExit> {
        let status = self.child.wait().await?;

        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Ok(ProcessExit {
            code: status.code(),
            signal,
        })
    }
}
