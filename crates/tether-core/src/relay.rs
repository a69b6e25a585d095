//! Output relay
//!
//! Forwards the worker's output channel to the host sink exactly once, in
//! order, without interpreting the bytes. The relay is pull-based: the run
//! loop calls `drain` every poll tick and the relay empties whatever the
//! channel has buffered.

use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use tether_channel::{Channel, ChannelError, ChannelResult};

/// Read buffer per drain pass
pub const READ_BUFFER_SIZE: usize = 4096;

/// Result of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing was available
    Idle,
    /// This many bytes were forwarded to the sink
    Forwarded(usize),
    /// The worker side of the output channel has gone away
    PeerClosed,
}

/// Forwards output-channel bytes to a host sink.
pub struct OutputRelay<W> {
    channel: Arc<Channel>,
    sink: W,
    forwarded: u64,
}

impl<W: AsyncWrite + Unpin> OutputRelay<W> {
    pub fn new(channel: Arc<Channel>, sink: W) -> Self {
        Self {
            channel,
            sink,
            forwarded: 0,
        }
    }

    /// Forward everything currently buffered on the channel.
    ///
    /// Chunks are written to the sink in arrival order and the sink is
    /// flushed once per pass, so partial chunks never linger across
    /// iterations. Peer disconnection is reported as an outcome, not an
    /// error; it is the normal end of the stream once the worker exits.
    pub async fn drain(&mut self) -> ChannelResult<DrainOutcome> {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let mut total = 0usize;

        loop {
            match self.channel.try_read(&mut buf).await {
                Ok(Some(n)) => {
                    self.sink
                        .write_all(&buf[..n])
                        .await
                        .map_err(ChannelError::Io)?;
                    total += n;
                }
                Ok(None) => break,
                Err(ChannelError::Disconnected) => {
                    if total > 0 {
                        self.flush_pass(total).await?;
                    }
                    return Ok(DrainOutcome::PeerClosed);
                }
                Err(e) => return Err(e),
            }
        }

        if total > 0 {
            self.flush_pass(total).await?;
            return Ok(DrainOutcome::Forwarded(total));
        }
        Ok(DrainOutcome::Idle)
    }

    async fn flush_pass(&mut self, total: usize) -> ChannelResult<()> {
        self.sink.flush().await.map_err(ChannelError::Io)?;
        self.forwarded += total as u64;
        trace!(bytes = total, "output forwarded");
        Ok(())
    }

    /// Total bytes forwarded over the relay's lifetime.
    pub fn bytes_forwarded(&self) -> u64 {
        self.forwarded
    }
}
