//! Per-connection session lifecycle
//!
//! One call to [`SessionOrchestrator::run`] covers a session from start to
//! finish. It allocates the session id, opens the audit sinks, and
//! classifies the request. It then spawns the child, wires the stream
//! copies around it, and waits for everything to drain.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use jsshd_core::error::SessionError;
use jsshd_core::traits::{
    LogManager, ProcessExit, ProcessSpawner, SpawnRequest, SpawnedProcess, StdinWriter,
};
use jsshd_core::{AuditEventKind, Identity, PtyRequest, SessionId, WindowSize};

use super::audit::AuditRecorder;
use super::client::{ClientChannel, OutputStream};
use super::fanout::{transcript_relay, Fanout};
use super::registry::SessionRegistry;
use super::resize::spawn_resize_watcher;

/// What the client asked for on its session channel
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Login name the client authenticated as
    pub user: String,
    /// Remote peer address
    pub remote_addr: SocketAddr,
    /// Identity bound during authentication
    pub identity: Option<Identity>,
    /// Explicit command; `None` requests an interactive shell
    pub command: Option<String>,
    /// Environment negotiated by the client
    pub env: Vec<(String, String)>,
    /// Terminal request, if any
    pub pty: Option<PtyRequest>,
}

/// Streams connecting a session to its client
pub struct SessionIo {
    /// Output half of the channel
    pub client: Arc<dyn ClientChannel>,
    /// Client input; closing the sender signals end of input
    pub input: mpsc::UnboundedReceiver<Bytes>,
    /// Window-change notifications
    pub resizes: mpsc::UnboundedReceiver<WindowSize>,
}

/// Request-scoped state of an established session
#[derive(Debug)]
pub struct ConnectionContext {
    /// Globally unique session id
    pub session_id: SessionId,
    /// Account the session runs as
    pub identity: Identity,
    /// Remote peer address
    pub remote_addr: SocketAddr,
    /// Event-audit sink
    pub audit: AuditRecorder,
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// Session id
    pub session_id: SessionId,
    /// Child exit, when it could be collected
    pub exit: Option<ProcessExit>,
}

/// A setup failure plus the line shown to the client
struct Refusal {
    error: SessionError,
    message: &'static str,
}

impl Refusal {
    fn new(error: SessionError, message: &'static str) -> Self {
        Self { error, message }
    }
}

/// Runs sessions for authenticated connections
pub struct SessionOrchestrator {
    spawner: Arc<dyn ProcessSpawner>,
    logs: Arc<dyn LogManager>,
    registry: Arc<SessionRegistry>,
    relay_capacity: usize,
}

impl SessionOrchestrator {
    /// Create an orchestrator
    pub fn new(
        spawner: Arc<dyn ProcessSpawner>,
        logs: Arc<dyn LogManager>,
        relay_capacity: usize,
    ) -> Self {
        Self {
            spawner,
            logs,
            registry: Arc::new(SessionRegistry::new()),
            relay_capacity,
        }
    }

    /// Live sessions
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Run one session to completion.
    ///
    /// Setup failures are reported to the client (a one-line reason, then
    /// exit status 1) and returned. Cancelling `cancel` kills the child
    /// and tears the session down.
    pub async fn run(
        &self,
        request: SessionRequest,
        io: SessionIo,
        cancel: CancellationToken,
    ) -> Result<SessionSummary, SessionError> {
        let remote_addr = request.remote_addr;
        let lease = self.registry.register(&request.user, remote_addr);
        let session_id = lease.id();
        let client = Arc::clone(&io.client);

        let event_sink = match self.logs.event_log(&session_id).await {
            Ok(sink) => sink,
            Err(e) => {
                let refusal =
                    Refusal::new(SessionError::EventLog(e), "Failed to create event log");
                return Err(refuse(client.as_ref(), refusal).await);
            }
        };

        let Some(identity) = request.identity else {
            let refusal = Refusal::new(
                SessionError::MissingIdentity,
                "Error retrieving credentials from session",
            );
            return Err(refuse(client.as_ref(), refusal).await);
        };

        let (audit, event_writer) = AuditRecorder::start(
            event_sink,
            session_id,
            &identity.username,
            request.command.as_deref().unwrap_or_default(),
            remote_addr,
        );
        let ctx = ConnectionContext {
            session_id,
            identity,
            remote_addr,
            audit,
        };

        let outcome = self
            .serve(&ctx, request.command, request.env, request.pty, io, cancel)
            .await;

        let username = ctx.identity.username.clone();
        drop(ctx);
        if let Err(e) = event_writer.await {
            tracing::error!("Event log writer for session {} failed: {}", session_id, e);
        }

        match outcome {
            Ok(summary) => {
                if let Err(e) = client.exit(0).await {
                    tracing::debug!("Failed to report exit status: {}", e);
                }
                tracing::info!("User {} logged out", username);
                Ok(summary)
            }
            Err(refusal) => Err(refuse(client.as_ref(), refusal).await),
        }
    }

    async fn serve(
        &self,
        ctx: &ConnectionContext,
        command: Option<String>,
        env: Vec<(String, String)>,
        pty: Option<PtyRequest>,
        io: SessionIo,
        cancel: CancellationToken,
    ) -> Result<SessionSummary, Refusal> {
        ctx.audit.record(AuditEventKind::Auth);
        tracing::info!(
            "User {} logged in from {}",
            ctx.identity.username,
            ctx.remote_addr
        );

        let session_stop = match &command {
            Some(command) => {
                ctx.audit.record(AuditEventKind::for_command(command));
                None
            }
            None => Some(ctx.audit.session_started()),
        };

        let transcript = self
            .logs
            .session_log(&ctx.session_id)
            .await
            .map_err(|e| {
                Refusal::new(SessionError::SessionLog(e), "Failed to create session log")
            })?;

        let spawn_request = spawn_request(&ctx.identity, command, env, pty);
        let SpawnedProcess {
            stdin,
            mut stdout,
            stderr,
            terminal,
            mut child,
        } = self
            .spawner
            .spawn(&spawn_request)
            .map_err(|e| Refusal::new(e, "Failed to start session"))?;

        let SessionIo {
            client,
            input,
            resizes,
        } = io;
        let (relay, transcript_writer) = transcript_relay(transcript, self.relay_capacity);
        let scope = cancel.child_token();

        let watcher = terminal.map(|terminal| {
            spawn_resize_watcher(terminal, resizes, ctx.audit.clone(), scope.clone())
        });

        let stderr_copy = stderr.map(|mut stderr| {
            let mut fanout =
                Fanout::new(Arc::clone(&client), OutputStream::Stderr, relay.clone());
            tokio::spawn(async move {
                if let Err(e) = fanout.copy_from(&mut stderr).await {
                    tracing::error!("Failed to write stderr to user: {}", e);
                }
            })
        });

        // A terminal shares one device for both directions and closes with
        // the child, so only pipes get an explicit EOF
        let stdin_copy = tokio::spawn(forward_input(input, stdin, !spawn_request.is_pty()));

        let mut fanout = Fanout::new(Arc::clone(&client), OutputStream::Stdout, relay);
        tokio::select! {
            result = fanout.copy_from(&mut stdout) => {
                if let Err(e) = result {
                    tracing::error!("Failed to write stdout to user: {}", e);
                }
            }
            _ = scope.cancelled() => {
                tracing::debug!("Session {} cancelled", ctx.session_id);
                if let Err(e) = child.kill() {
                    tracing::debug!("Failed to kill session {} child: {}", ctx.session_id, e);
                }
            }
        }
        drop(fanout);

        let exit = match child.wait().await {
            Ok(exit) => {
                if !exit.success() {
                    tracing::debug!("Shell did not close correctly: {:?}", exit);
                }
                Some(exit)
            }
            Err(e) => {
                tracing::debug!("Failed to collect session {} child: {}", ctx.session_id, e);
                None
            }
        };

        if let Some(task) = stderr_copy {
            let _ = task.await;
        }
        stdin_copy.abort();
        let _ = stdin_copy.await;

        scope.cancel();
        if let Some(watcher) = watcher {
            let _ = watcher.await;
        }

        drop(session_stop);
        let _ = transcript_writer.await;

        Ok(SessionSummary {
            session_id: ctx.session_id,
            exit,
        })
    }
}

/// Child environment: the client's variables, then the forced overrides
fn spawn_request(
    identity: &Identity,
    command: Option<String>,
    mut env: Vec<(String, String)>,
    pty: Option<PtyRequest>,
) -> SpawnRequest {
    env.push(("USER".to_string(), identity.username.clone()));
    env.push((
        "HOME".to_string(),
        identity.home_dir.to_string_lossy().into_owned(),
    ));
    if let Some(pty) = &pty {
        env.push(("TERM".to_string(), pty.term.clone()));
    }

    SpawnRequest {
        program: identity.shell.clone(),
        command,
        env,
        cwd: identity.home_dir.clone(),
        pty,
    }
}

/// Copy client input to the child's stdin.
///
/// Returns the writer when it must stay open past the end of input;
/// otherwise it is dropped here, closing the pipe.
async fn forward_input(
    mut input: mpsc::UnboundedReceiver<Bytes>,
    mut stdin: StdinWriter,
    close_on_eof: bool,
) -> Option<StdinWriter> {
    while let Some(chunk) = input.recv().await {
        if let Err(e) = stdin.write_all(&chunk).await {
            tracing::error!("Failed to write incoming command to shell: {}", e);
            break;
        }
    }

    if !close_on_eof {
        return Some(stdin);
    }
    if let Err(e) = stdin.shutdown().await {
        tracing::debug!("Failed to close shell stdin: {}", e);
    }
    None
}

/// Tell the client why setup failed and end its session with status 1
async fn refuse(client: &dyn ClientChannel, refusal: Refusal) -> SessionError {
    let Refusal { error, message } = refusal;
    tracing::error!("{}", error);

    let line = format!("{}\n", message);
    if let Err(e) = client.send(OutputStream::Stdout, line.as_bytes()).await {
        tracing::error!("{}: Failed to write to SSH session: {}", message, e);
    }
    if let Err(e) = client.exit(1).await {
        tracing::error!("Failed to close SSH session: {}", e);
    }
    error
}
