//! Heartbeat emission
//!
//! The worker watches for these tokens to detect supervisor disappearance
//! (an abrupt host kill never delivers a shutdown token) and self-terminate
//! instead of lingering as an orphan. Emission cadence is driven by the run
//! loop; this type only knows how to emit one beat.

use std::sync::Arc;
use tracing::{debug, warn};

use tether_channel::{Channel, ChannelError, ControlToken};

/// Writes the liveness token on the control channel.
pub struct HeartbeatEmitter {
    channel: Arc<Channel>,
    sent: u64,
}

impl HeartbeatEmitter {
    pub fn new(channel: Arc<Channel>) -> Self {
        Self { channel, sent: 0 }
    }

    /// Emit one heartbeat. A failed write is not fatal: it is logged and
    /// the next tick simply tries again. Once the channel has been closed
    /// (the shutdown bridge fired) beats stop without noise.
    pub async fn beat(&mut self) {
        match self
            .channel
            .write(ControlToken::Heartbeat.as_bytes())
            .await
        {
            Ok(()) => self.sent += 1,
            Err(ChannelError::Closed) => {
                debug!("control channel closed, heartbeat suppressed");
            }
            Err(e) => {
                warn!(error = %e, "heartbeat write failed, will retry next tick");
            }
        }
    }

    /// Number of heartbeats successfully written.
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tether_channel::Direction;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::UnixStream;

    #[tokio::test]
    async fn beats_arrive_as_heartbeat_tokens() {
        let dir = tempdir().unwrap();
        let channel =
            Arc::new(Channel::create("control", Direction::Duplex, dir.path()).unwrap());
        let path = channel.path().to_path_buf();
        let peer = tokio::spawn(async move { UnixStream::connect(path).await.unwrap() });
        channel.await_peer(None).await.unwrap();
        let peer = peer.await.unwrap();

        let mut emitter = HeartbeatEmitter::new(channel.clone());
        emitter.beat().await;
        emitter.beat().await;
        assert_eq!(emitter.sent(), 2);

        let mut lines = tokio::io::BufReader::new(peer).lines();
        for _ in 0..2 {
            let line = lines.next_line().await.unwrap().unwrap();
            assert_eq!(ControlToken::parse(&line), Some(ControlToken::Heartbeat));
        }
    }

    #[tokio::test]
    async fn closed_channel_suppresses_beats() {
        let dir = tempdir().unwrap();
        let channel =
            Arc::new(Channel::create("control", Direction::Duplex, dir.path()).unwrap());
        let path = channel.path().to_path_buf();
        let peer = tokio::spawn(async move { UnixStream::connect(path).await.unwrap() });
        channel.await_peer(None).await.unwrap();
        let _peer = peer.await.unwrap();

        channel.close().await;

        let mut emitter = HeartbeatEmitter::new(channel);
        emitter.beat().await;
        emitter.beat().await;
        assert_eq!(emitter.sent(), 0);
    }
}
