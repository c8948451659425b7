//! SSH connection handler
//!
//! Implements the russh server handler: authenticates the client, collects
//! the session channel's requests (pty, env, window changes, input), and
//! hands the session to the orchestrator once a shell or command is
//! requested.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use russh::keys::{Certificate, PrivateKey, PublicKey};
use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId, MethodKind, MethodSet, Pty, SshId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use jsshd_core::config::SshdConfig;
use jsshd_core::{Identity, PtyRequest, WindowSize};

use crate::auth::PresentedKey;
use crate::server::channel::RusshClient;
use crate::server::forwarding::{
    bind_remote, forward_local, spawn_remote_forward, tcp_port, ForwardDirection, ForwardRequest,
};
use crate::session::{SessionIo, SessionRequest};
use crate::state::ServerState;

/// Requests collected on a session channel before it starts
struct ChannelState {
    env: Vec<(String, String)>,
    pty: Option<PtyRequest>,
    input: Option<mpsc::UnboundedSender<Bytes>>,
    resizes: mpsc::UnboundedSender<WindowSize>,
    /// Receivers handed to the session when it starts
    pending: Option<(
        mpsc::UnboundedReceiver<Bytes>,
        mpsc::UnboundedReceiver<WindowSize>,
    )>,
}

impl ChannelState {
    fn new() -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (resize_tx, resize_rx) = mpsc::unbounded_channel();
        Self {
            env: Vec::new(),
            pty: None,
            input: Some(input_tx),
            resizes: resize_tx,
            pending: Some((input_rx, resize_rx)),
        }
    }
}

/// Handler for a single SSH client connection
pub struct ConnectionHandler {
    /// Shared daemon state
    state: Arc<ServerState>,
    /// Peer address of the connecting client
    peer_addr: SocketAddr,
    /// Cancellation scope of this connection
    cancel: CancellationToken,
    /// Login name accepted during authentication
    user: Option<String>,
    /// Identity bound by key-based authentication
    identity: Option<Identity>,
    /// Open session channels
    channels: HashMap<ChannelId, ChannelState>,
    /// Active remote forwards by bound address and port
    remote_forwards: HashMap<(String, u32), CancellationToken>,
}

impl ConnectionHandler {
    /// Create a handler for the connection from `peer_addr`
    pub fn new(state: Arc<ServerState>, peer_addr: SocketAddr, cancel: CancellationToken) -> Self {
        Self {
            state,
            peer_addr,
            cancel,
            user: None,
            identity: None,
            channels: HashMap::new(),
            remote_forwards: HashMap::new(),
        }
    }

    fn reject(&self, user: &str, reason: impl std::fmt::Display) -> Auth {
        tracing::debug!(
            "Authentication rejected for {} from {}: {}",
            user,
            self.peer_addr,
            reason
        );
        Auth::Reject {
            proceed_with_methods: None,
            partial_success: false,
        }
    }

    /// Run `presented` through the pipeline, binding the identity on success
    async fn accept_key(&mut self, user: &str, presented: PresentedKey) -> Auth {
        match self.state.auth.check_key(user, &presented).await {
            Ok(identity) => {
                tracing::debug!(
                    "Accepted {} for {} from {}",
                    if presented.is_certificate() { "certificate" } else { "public key" },
                    user,
                    self.peer_addr
                );
                self.user = Some(user.to_string());
                self.identity = Some(identity);
                Auth::Accept
            }
            Err(e) => self.reject(user, e),
        }
    }

    fn forwarding_allowed(&self, request: &ForwardRequest<'_>) -> bool {
        let allowed = self.state.forwarding_allowed(request);
        if !allowed {
            tracing::debug!("Port forwarding denied for {}: {}", self.peer_addr, request);
        }
        allowed
    }

    /// Start the session on `channel` with an optional explicit command
    fn start_session(
        &mut self,
        channel: ChannelId,
        command: Option<String>,
        session: &mut Session,
    ) -> Result<(), russh::Error> {
        let Some(state) = self.channels.get_mut(&channel) else {
            return session.channel_failure(channel);
        };
        let Some((input, resizes)) = state.pending.take() else {
            tracing::debug!("Channel {:?} already running a session", channel);
            return session.channel_failure(channel);
        };

        let request = SessionRequest {
            user: self.user.clone().unwrap_or_default(),
            remote_addr: self.peer_addr,
            identity: self.identity.clone(),
            command,
            env: state.env.clone(),
            pty: state.pty.clone(),
        };
        let io = SessionIo {
            client: Arc::new(RusshClient::new(session.handle(), channel)),
            input,
            resizes,
        };
        session.channel_success(channel)?;

        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();
        let peer_addr = self.peer_addr;
        tokio::spawn(async move {
            match state.sessions.run(request, io, cancel.clone()).await {
                Ok(summary) => {
                    tracing::debug!(
                        "Session {} from {} finished: {:?}",
                        summary.session_id,
                        peer_addr,
                        summary.exit
                    );
                }
                Err(e) => {
                    tracing::error!("Closing connection from {}: {}", peer_addr, e);
                    cancel.cancel();
                }
            }
        });
        Ok(())
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        for token in self.remote_forwards.values() {
            token.cancel();
        }
    }
}

impl Handler for ConnectionHandler {
    type Error = anyhow::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if let Err(e) = self.state.auth.check_password(user, password) {
            return Ok(self.reject(user, e));
        }

        // The password method binds no identity
        self.user = Some(user.to_string());
        Ok(Auth::Accept)
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        let presented = PresentedKey::Plain(public_key.clone());
        Ok(self.accept_key(user, presented).await)
    }

    async fn auth_openssh_certificate(
        &mut self,
        user: &str,
        certificate: &Certificate,
    ) -> Result<Auth, Self::Error> {
        let presented = PresentedKey::Certificate(Box::new(certificate.clone()));
        Ok(self.accept_key(user, presented).await)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        tracing::debug!("Channel opened: {:?}", channel.id());
        self.channels.insert(channel.id(), ChannelState::new());
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        match self.channels.get_mut(&channel) {
            Some(state) => {
                state.pty = Some(PtyRequest {
                    term: term.to_string(),
                    size: WindowSize::from_wire(col_width, row_height, pix_width, pix_height),
                });
                session.channel_success(channel)?;
            }
            None => session.channel_failure(channel)?,
        }
        Ok(())
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        variable_name: &str,
        variable_value: &str,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(state) = self.channels.get_mut(&channel) {
            state
                .env
                .push((variable_name.to_string(), variable_value.to_string()));
        }
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(state) = self.channels.get(&channel) {
            let size = WindowSize::from_wire(col_width, row_height, pix_width, pix_height);
            let _ = state.resizes.send(size);
        }
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.start_session(channel, None, session)?;
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data).into_owned();
        self.start_session(channel, Some(command), session)?;
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::trace!("Received {} bytes on channel {:?}", data.len(), channel);

        if let Some(input) = self.channels.get(&channel).and_then(|s| s.input.as_ref()) {
            let _ = input.send(Bytes::copy_from_slice(data));
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("Channel EOF: {:?}", channel);
        if let Some(state) = self.channels.get_mut(&channel) {
            state.input = None;
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("Channel closed: {:?}", channel);
        self.channels.remove(&channel);
        Ok(())
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let request = ForwardRequest {
            direction: ForwardDirection::Local,
            host: host_to_connect,
            port: port_to_connect,
        };
        if !self.forwarding_allowed(&request) {
            return Ok(false);
        }
        let Some(port) = tcp_port(port_to_connect) else {
            return Ok(false);
        };

        tracing::debug!(
            "Forwarding {} for {}:{}",
            request,
            originator_address,
            originator_port
        );
        let host = host_to_connect.to_string();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = forward_local(channel, host, port) => {}
            }
        });
        Ok(true)
    }

    async fn tcpip_forward(
        &mut self,
        address: &str,
        port: &mut u32,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let request = ForwardRequest {
            direction: ForwardDirection::Remote,
            host: address,
            port: *port,
        };
        if !self.forwarding_allowed(&request) {
            return Ok(false);
        }
        let Some(tcp) = tcp_port(*port) else {
            return Ok(false);
        };

        let listener = match bind_remote(address, tcp).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::debug!("Failed to bind {}:{}: {}", address, port, e);
                return Ok(false);
            }
        };
        if *port == 0 {
            if let Ok(local) = listener.local_addr() {
                *port = u32::from(local.port());
            }
        }

        tracing::debug!("Remote forward listening on {}:{}", address, port);
        let token = self.cancel.child_token();
        spawn_remote_forward(
            listener,
            session.handle(),
            address.to_string(),
            *port,
            token.clone(),
        );
        if let Some(previous) = self.remote_forwards.insert((address.to_string(), *port), token) {
            previous.cancel();
        }
        Ok(true)
    }

    async fn cancel_tcpip_forward(
        &mut self,
        address: &str,
        port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        match self.remote_forwards.remove(&(address.to_string(), port)) {
            Some(token) => {
                token.cancel();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Configuration for the SSH server
#[derive(Clone)]
pub struct ServerConfig {
    /// russh server configuration
    pub ssh_config: Arc<russh::server::Config>,
}

impl ServerConfig {
    /// Create a server configuration with the given host key
    pub fn new(config: &SshdConfig, host_key: PrivateKey) -> Self {
        let methods: &[MethodKind] = if config.password_auth {
            &[MethodKind::Password, MethodKind::PublicKey]
        } else {
            &[MethodKind::PublicKey]
        };
        let ssh_config = russh::server::Config {
            server_id: SshId::Standard(config.server_id()),
            methods: MethodSet::from(methods),
            auth_rejection_time: config.auth_rejection_time,
            auth_rejection_time_initial: Some(std::time::Duration::from_secs(0)),
            keys: vec![host_key],
            ..Default::default()
        };

        Self {
            ssh_config: Arc::new(ssh_config),
        }
    }
}
