//! TCP port forwarding
//!
//! Local (`direct-tcpip`) and remote (`tcpip-forward`) requests are only
//! honoured when forwarding is enabled, and then only if the configured
//! policy allows them.

use std::fmt;
use std::net::SocketAddr;

use russh::server::{Handle, Msg};
use russh::Channel;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Direction of a forwarding request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardDirection {
    /// Client asks the server to dial out (`ssh -L`)
    Local,
    /// Client asks the server to listen (`ssh -R`)
    Remote,
}

/// A single forwarding request as seen by the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardRequest<'a> {
    /// Direction
    pub direction: ForwardDirection,
    /// Host to connect to, or address to bind
    pub host: &'a str,
    /// Port to connect to, or port to bind
    pub port: u32,
}

impl fmt::Display for ForwardRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}:{}", self.direction, self.host, self.port)
    }
}

/// Decides whether a forwarding request is allowed
pub trait ForwardingPolicy: Send + Sync {
    /// Return `true` to allow the request
    fn allow(&self, request: &ForwardRequest<'_>) -> bool;
}

/// Allows every request
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl ForwardingPolicy for AllowAll {
    fn allow(&self, _request: &ForwardRequest<'_>) -> bool {
        true
    }
}

/// Convert a wire port to a TCP port
pub fn tcp_port(port: u32) -> Option<u16> {
    u16::try_from(port).ok()
}

/// Copy both directions between two streams until both sides finish
pub async fn splice<A, B>(a: &mut A, b: &mut B, label: &str)
where
    A: AsyncRead + AsyncWrite + Unpin + ?Sized,
    B: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    match tokio::io::copy_bidirectional(a, b).await {
        Ok((up, down)) => {
            tracing::debug!("Forwarding {} finished ({} bytes up, {} down)", label, up, down)
        }
        Err(e) => tracing::debug!("Forwarding {} ended: {}", label, e),
    }
}

/// Dial `host:port` and connect it to a `direct-tcpip` channel
pub async fn forward_local(channel: Channel<Msg>, host: String, port: u16) {
    let label = format!("{}:{}", host, port);
    let mut socket = match TcpStream::connect((host.as_str(), port)).await {
        Ok(socket) => socket,
        Err(e) => {
            tracing::debug!("Failed to connect to {}: {}", label, e);
            let _ = channel.close().await;
            return;
        }
    };

    let mut stream = Box::pin(channel.into_stream());
    splice(&mut stream, &mut socket, &label).await;
}

/// Bind the listener for a `tcpip-forward` request.
///
/// An empty address means every interface.
pub async fn bind_remote(address: &str, port: u16) -> std::io::Result<TcpListener> {
    let host = if address.is_empty() { "0.0.0.0" } else { address };
    TcpListener::bind((host, port)).await
}

/// Accept on `listener` and open a `forwarded-tcpip` channel per connection
/// until `cancel` fires
pub fn spawn_remote_forward(
    listener: TcpListener,
    handle: Handle,
    address: String,
    port: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Remote forward {}:{} cancelled", address, port);
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        let handle = handle.clone();
                        let address = address.clone();
                        tokio::spawn(open_forwarded(handle, address, port, socket, peer));
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept on {}:{}: {}", address, port, e);
                        break;
                    }
                },
            }
        }
    })
}

async fn open_forwarded(
    handle: Handle,
    address: String,
    port: u32,
    mut socket: TcpStream,
    peer: SocketAddr,
) {
    let channel = match handle
        .channel_open_forwarded_tcpip(
            address.clone(),
            port,
            peer.ip().to_string(),
            u32::from(peer.port()),
        )
        .await
    {
        Ok(channel) => channel,
        Err(e) => {
            tracing::debug!("Client refused forwarded connection from {}: {:?}", peer, e);
            return;
        }
    };

    let mut stream = Box::pin(channel.into_stream());
    splice(&mut stream, &mut socket, &format!("{}:{} <- {}", address, port, peer)).await;
}
