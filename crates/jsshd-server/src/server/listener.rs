//! SSH server listener
//!
//! Accepts incoming connections and spawns a handler for each client.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use russh::Disconnect;
use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::ssh_key::{Algorithm, LineEnding};
use russh::keys::PrivateKey;
use tokio::net::{TcpListener, TcpStream};

use crate::server::handler::{ConnectionHandler, ServerConfig};
use crate::state::ServerState;

/// SSH server that listens for incoming connections
pub struct SshServer {
    /// Server configuration
    config: ServerConfig,
    /// Shared daemon state
    state: Arc<ServerState>,
}

impl SshServer {
    /// Create a new SSH server
    pub fn new(host_key: PrivateKey, state: Arc<ServerState>) -> Self {
        Self {
            config: ServerConfig::new(&state.config, host_key),
            state,
        }
    }

    /// Bind `bind_addr` and serve until shutdown
    pub async fn run(&self, bind_addr: &str) -> Result<()> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!("SSH server listening on {}", local_addr);

        loop {
            tokio::select! {
                _ = self.state.shutdown.wait() => {
                    tracing::info!("SSH server shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Handle a new incoming connection
    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        tracing::info!("New connection from {}", peer_addr);

        let config = Arc::clone(&self.config.ssh_config);
        let state = Arc::clone(&self.state);
        let scope = state.shutdown.connection_scope();

        tokio::spawn(async move {
            let handler = ConnectionHandler::new(state, peer_addr, scope.clone());

            let session = match russh::server::run_stream(config, socket, handler).await {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!("Handshake with {} failed: {}", peer_addr, e);
                    scope.cancel();
                    return;
                }
            };

            let handle = session.handle();
            tokio::pin!(session);

            let result = tokio::select! {
                result = &mut session => result,
                _ = scope.cancelled() => {
                    tracing::debug!("Disconnecting {}", peer_addr);
                    let _ = handle
                        .disconnect(
                            Disconnect::ByApplication,
                            "Server closing connection".to_string(),
                            String::new(),
                        )
                        .await;
                    session.await
                }
            };

            match result {
                Ok(()) => {
                    tracing::info!("Connection from {} closed normally", peer_addr);
                }
                Err(e) => {
                    tracing::warn!("Connection from {} closed with error: {}", peer_addr, e);
                }
            }

            // Stops sessions and forwards still tied to this connection
            scope.cancel();
        });
    }
}

/// Load or generate a host key
pub async fn load_or_generate_host_key(path: &Path) -> Result<PrivateKey> {
    if path.exists() {
        tracing::info!("Loading host key from {:?}", path);
        let key = russh::keys::load_secret_key(path, None)
            .with_context(|| format!("Failed to load host key from {:?}", path))?;
        return Ok(key);
    }

    tracing::info!("Generating new host key at {:?}", path);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
        .context("Failed to generate Ed25519 key")?;

    let encoded = key
        .to_openssh(LineEnding::LF)
        .context("Failed to encode host key")?;
    tokio::fs::write(path, encoded.as_bytes())
        .await
        .with_context(|| format!("Failed to write host key to {:?}", path))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .with_context(|| format!("Failed to restrict permissions on {:?}", path))?;
    }

    Ok(key)
}
