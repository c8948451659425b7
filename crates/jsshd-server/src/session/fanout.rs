//! Output fan-out to the client and the transcript

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use jsshd_core::traits::LogWriter;

use super::client::{ClientChannel, OutputStream};

/// Read size for child output
const CHUNK_SIZE: usize = 8192;

/// Sender side of the relay feeding the transcript writer
pub type TranscriptRelay = mpsc::Sender<Bytes>;

/// Start the transcript writer.
///
/// The writer drains the relay until every sender is dropped, then closes
/// the sink. Once the relay holds `capacity` chunks, senders wait.
pub fn transcript_relay(sink: LogWriter, capacity: usize) -> (TranscriptRelay, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, tokio::spawn(write_transcript(sink, rx)))
}

async fn write_transcript(mut sink: LogWriter, mut rx: mpsc::Receiver<Bytes>) {
    let mut failed = false;

    while let Some(chunk) = rx.recv().await {
        if failed {
            continue;
        }
        if let Err(e) = sink.write_all(&chunk).await {
            tracing::error!("Failed to write session log: {}", e);
            // Keep draining so the interactive path is never blocked
            failed = true;
        }
    }

    if let Err(e) = sink.shutdown().await {
        tracing::debug!("Failed to close session log: {}", e);
    }
}

/// Writes every chunk to the client and to the transcript relay
pub struct Fanout {
    client: Arc<dyn ClientChannel>,
    stream: OutputStream,
    relay: TranscriptRelay,
    relay_closed: bool,
}

impl Fanout {
    /// Fan out to `stream` of `client`
    pub fn new(
        client: Arc<dyn ClientChannel>,
        stream: OutputStream,
        relay: TranscriptRelay,
    ) -> Self {
        Self {
            client,
            stream,
            relay,
            relay_closed: false,
        }
    }

    /// Write one chunk.
    ///
    /// Only a client failure is returned; a closed relay is logged once and
    /// the transcript misses the remaining bytes.
    pub async fn write(&mut self, chunk: Bytes) -> std::io::Result<()> {
        if !self.relay_closed && self.relay.send(chunk.clone()).await.is_err() {
            tracing::error!("Session log relay closed; transcript is incomplete");
            self.relay_closed = true;
        }
        self.client.send(self.stream, &chunk).await
    }

    /// Copy `reader` until end of stream, returning the number of bytes moved
    pub async fn copy_from<R>(&mut self, reader: &mut R) -> std::io::Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut total = 0u64;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            self.write(Bytes::copy_from_slice(&buf[..n])).await?;
            total += n as u64;
        }
    }
}
