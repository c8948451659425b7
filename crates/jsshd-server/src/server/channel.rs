//! Session channel output over the SSH transport

use async_trait::async_trait;
use russh::server::Handle;
use russh::{ChannelId, CryptoVec};

use crate::session::{ClientChannel, OutputStream};

/// Extended data type code for stderr
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Writes session output to one channel of a client connection
pub struct RusshClient {
    handle: Handle,
    channel: ChannelId,
}

impl RusshClient {
    /// Wrap `channel` of the connection behind `handle`
    pub fn new(handle: Handle, channel: ChannelId) -> Self {
        Self { handle, channel }
    }
}

fn closed() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::BrokenPipe, "SSH channel closed")
}

#[async_trait]
impl ClientChannel for RusshClient {
    async fn send(&self, stream: OutputStream, data: &[u8]) -> std::io::Result<()> {
        let data = CryptoVec::from_slice(data);
        let result = match stream {
            OutputStream::Stdout => self.handle.data(self.channel, data).await,
            OutputStream::Stderr => {
                self.handle
                    .extended_data(self.channel, SSH_EXTENDED_DATA_STDERR, data)
                    .await
            }
        };
        result.map_err(|_| closed())
    }

    async fn exit(&self, status: u32) -> std::io::Result<()> {
        self.handle
            .exit_status_request(self.channel, status)
            .await
            .map_err(|_| closed())?;
        self.handle.eof(self.channel).await.map_err(|_| closed())?;
        self.handle.close(self.channel).await.map_err(|_| closed())
    }
}
