//! The client side of a session channel

use async_trait::async_trait;

/// Which client stream a chunk of output belongs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Regular channel data
    Stdout,
    /// Extended data, type 1
    Stderr,
}

/// Output half of the remote client's session channel
#[async_trait]
pub trait ClientChannel: Send + Sync {
    /// Deliver bytes to the client
    async fn send(&self, stream: OutputStream, data: &[u8]) -> std::io::Result<()>;

    /// Report the exit status, then close the channel
    async fn exit(&self, status: u32) -> std::io::Result<()>;
}
