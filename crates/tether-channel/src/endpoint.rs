//! Channel endpoint implementation
//!
//! A `Channel` is a named byte-stream endpoint backed by a Unix domain
//! socket. The supervisor side binds a listener at a unique path under the
//! runtime directory; the worker connects to that path. The name doubles as
//! the socket path and is what gets passed on the worker's command line.

use std::os::fd::OwnedFd;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::{ChannelError, ChannelResult};
use tether_util::unique_endpoint_name;

/// Data direction of a channel, from the supervisor's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Worker writes, supervisor reads (the output channel)
    Inbound,
    /// Supervisor writes, worker reads
    Outbound,
    /// Both sides may read and write (the control channel)
    Duplex,
}

/// Connection state of a channel endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Created,
    AwaitingPeer,
    Connected,
    Closed,
}

struct Inner {
    state: ConnectionState,
    listener: Option<UnixListener>,
    stream: Option<UnixStream>,
}

/// A named inter-process byte-stream endpoint.
///
/// All methods take `&self`; state is guarded by an internal mutex so the
/// endpoint can be shared between the run loop and the signal bridge.
/// `close` is idempotent and a write racing a close fails with
/// [`ChannelError::Closed`] instead of touching freed state.
pub struct Channel {
    name: String,
    path: PathBuf,
    direction: Direction,
    inner: Mutex<Inner>,
}

impl Channel {
    /// Allocate an endpoint with a name unique to this supervisor instance.
    ///
    /// Binds a listener socket at `<runtime_dir>/<prefix>-<pid>-<salt>.sock`.
    /// The runtime directory is created if missing. Fails with
    /// [`ChannelError::Create`] carrying the OS error if the socket cannot
    /// be allocated.
    pub fn create(
        prefix: &str,
        direction: Direction,
        runtime_dir: &Path,
    ) -> ChannelResult<Self> {
        std::fs::create_dir_all(runtime_dir).map_err(ChannelError::Create)?;

        let name = format!("{}.sock", unique_endpoint_name(prefix));
        let path = runtime_dir.join(&name);

        let listener = UnixListener::bind(&path).map_err(ChannelError::Create)?;

        // Only the owning user may connect
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .map_err(ChannelError::Create)?;

        debug!(channel = %name, path = %path.display(), ?direction, "channel created");

        Ok(Self {
            name,
            path,
            direction,
            inner: Mutex::new(Inner {
                state: ConnectionState::Created,
                listener: Some(listener),
                stream: None,
            }),
        })
    }

    /// The channel's name (also the final component of its socket path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full socket path, as handed to the worker on its command line.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Wait for the peer to connect.
    ///
    /// Returns immediately if a peer is already connected. With
    /// `timeout = None` this blocks until the peer arrives, however long
    /// that takes; with `Some(t)` it fails with
    /// [`ChannelError::ConnectTimeout`] after `t` and leaves the endpoint
    /// ready for another attempt.
    pub async fn await_peer(&self, timeout: Option<Duration>) -> ChannelResult<()> {
        let mut inner = self.inner.lock().await;

        match inner.state {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Closed => return Err(ChannelError::Closed),
            ConnectionState::Created | ConnectionState::AwaitingPeer => {}
        }

        inner.state = ConnectionState::AwaitingPeer;
        let listener = inner.listener.take().ok_or(ChannelError::Closed)?;

        let accepted = match timeout {
            Some(t) => match tokio::time::timeout(t, listener.accept()).await {
                Ok(result) => result,
                Err(_) => {
                    inner.listener = Some(listener);
                    return Err(ChannelError::ConnectTimeout(t));
                }
            },
            None => listener.accept().await,
        };

        let (stream, _addr) = accepted.map_err(ChannelError::Io)?;
        inner.stream = Some(stream);
        inner.state = ConnectionState::Connected;

        debug!(channel = %self.name, "peer connected");
        Ok(())
    }

    /// Read any available bytes without blocking.
    ///
    /// Returns `Ok(None)` when nothing is available and the channel is
    /// open, `Ok(Some(n))` when `n` bytes were read into `buf`, and
    /// [`ChannelError::Disconnected`] once the peer has gone away.
    pub async fn try_read(&self, buf: &mut [u8]) -> ChannelResult<Option<usize>> {
        if self.direction == Direction::Outbound {
            return Err(ChannelError::Unsupported(self.direction));
        }

        let inner = self.inner.lock().await;
        if inner.state == ConnectionState::Closed {
            return Err(ChannelError::Closed);
        }
        let stream = inner.stream.as_ref().ok_or(ChannelError::NotConnected)?;

        match stream.try_read(buf) {
            Ok(0) => Err(ChannelError::Disconnected),
            Ok(n) => {
                trace!(channel = %self.name, bytes = n, "read");
                Ok(Some(n))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(ChannelError::Io(e)),
        }
    }

    /// Best-effort write of `bytes` to the peer.
    pub async fn write(&self, bytes: &[u8]) -> ChannelResult<()> {
        if self.direction == Direction::Inbound {
            return Err(ChannelError::Unsupported(self.direction));
        }

        let mut inner = self.inner.lock().await;
        if inner.state == ConnectionState::Closed {
            return Err(ChannelError::Closed);
        }
        let stream = inner.stream.as_mut().ok_or(ChannelError::NotConnected)?;

        stream.write_all(bytes).await.map_err(ChannelError::Io)
    }

    /// Close the endpoint and remove its socket path.
    ///
    /// Idempotent; safe to call from more than one holder, including
    /// concurrently with a write (the write fails with
    /// [`ChannelError::Closed`]).
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == ConnectionState::Closed {
            return;
        }
        inner.state = ConnectionState::Closed;
        inner.stream = None;
        inner.listener = None;

        if let Err(e) = std::fs::remove_file(&self.path) {
            trace!(channel = %self.name, error = %e, "socket unlink failed");
        }
        debug!(channel = %self.name, "channel closed");
    }

    /// Produce stdout/stderr handles for a worker process, wired to this
    /// channel.
    ///
    /// Connects a blocking client endpoint to the channel's own listener
    /// and accepts it, so bytes the worker writes to its standard streams
    /// arrive on this channel. Inbound channels only; the channel counts
    /// as connected from here on.
    pub async fn worker_stdio(&self) -> ChannelResult<(Stdio, Stdio)> {
        if self.direction != Direction::Inbound {
            return Err(ChannelError::Unsupported(self.direction));
        }

        let mut inner = self.inner.lock().await;
        if inner.state == ConnectionState::Closed {
            return Err(ChannelError::Closed);
        }
        let listener = inner.listener.take().ok_or(ChannelError::Closed)?;

        // The worker side stays a plain blocking socket; only the
        // supervisor's accepted end joins the async runtime.
        let client =
            std::os::unix::net::UnixStream::connect(&self.path).map_err(ChannelError::Io)?;
        let (stream, _addr) = listener.accept().await.map_err(ChannelError::Io)?;

        inner.stream = Some(stream);
        inner.state = ConnectionState::Connected;

        let stderr_end = client.try_clone().map_err(ChannelError::Io)?;
        let stdout = Stdio::from(OwnedFd::from(client));
        let stderr = Stdio::from(OwnedFd::from(stderr_end));
        Ok((stdout, stderr))
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn create_binds_socket() {
        let dir = tempdir().unwrap();
        let ch = Channel::create("output", Direction::Inbound, dir.path()).unwrap();

        assert!(ch.path().exists());
        assert_eq!(ch.state().await, ConnectionState::Created);
        assert!(ch.name().ends_with(".sock"));
    }

    #[tokio::test]
    async fn names_are_unique_per_channel() {
        let dir = tempdir().unwrap();
        let a = Channel::create("control", Direction::Duplex, dir.path()).unwrap();
        let b = Channel::create("control", Direction::Duplex, dir.path()).unwrap();

        assert_ne!(a.name(), b.name());
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn await_peer_times_out_without_peer() {
        let dir = tempdir().unwrap();
        let ch = Channel::create("control", Direction::Duplex, dir.path()).unwrap();

        let err = ch
            .await_peer(Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::ConnectTimeout(_)));

        // A later attempt still works once the peer shows up
        let path = ch.path().to_path_buf();
        let connector = tokio::spawn(async move { UnixStream::connect(path).await });
        ch.await_peer(Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(ch.state().await, ConnectionState::Connected);
        connector.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn round_trip_read_and_write() {
        let dir = tempdir().unwrap();
        let ch = Channel::create("control", Direction::Duplex, dir.path()).unwrap();
        let peer_path = ch.path().to_path_buf();

        let peer = tokio::spawn(async move { UnixStream::connect(peer_path).await.unwrap() });
        ch.await_peer(None).await.unwrap();
        let peer = peer.await.unwrap();

        // Nothing available yet
        let mut buf = [0u8; 64];
        assert!(ch.try_read(&mut buf).await.unwrap().is_none());

        // Peer writes, channel sees it without blocking
        peer.writable().await.unwrap();
        peer.try_write(b"ping").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let n = ch.try_read(&mut buf).await.unwrap().unwrap();
        assert_eq!(&buf[..n], b"ping");

        // Channel writes, peer sees it
        ch.write(b"pong\n").await.unwrap();
        peer.readable().await.unwrap();
        let mut peer_buf = [0u8; 64];
        let n = peer.try_read(&mut peer_buf).unwrap();
        assert_eq!(&peer_buf[..n], b"pong\n");
    }

    #[tokio::test]
    async fn disconnect_is_reported() {
        let dir = tempdir().unwrap();
        let ch = Channel::create("output", Direction::Inbound, dir.path()).unwrap();
        let peer_path = ch.path().to_path_buf();

        let peer = tokio::spawn(async move { UnixStream::connect(peer_path).await.unwrap() });
        ch.await_peer(None).await.unwrap();
        let peer = peer.await.unwrap();
        drop(peer);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut buf = [0u8; 16];
        let err = ch.try_read(&mut buf).await.unwrap_err();
        assert!(matches!(err, ChannelError::Disconnected));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_fails_writes() {
        let dir = tempdir().unwrap();
        let ch = Arc::new(Channel::create("control", Direction::Duplex, dir.path()).unwrap());
        let peer_path = ch.path().to_path_buf();

        let peer = tokio::spawn(async move { UnixStream::connect(peer_path).await.unwrap() });
        ch.await_peer(None).await.unwrap();
        let _peer = peer.await.unwrap();

        ch.close().await;
        ch.close().await;
        assert_eq!(ch.state().await, ConnectionState::Closed);
        assert!(!ch.path().exists());

        let err = ch.write(b"late\n").await.unwrap_err();
        assert!(matches!(err, ChannelError::Closed));

        // Two holders closing concurrently is fine too
        let a = ch.clone();
        let b = ch.clone();
        tokio::join!(a.close(), b.close());
    }

    #[tokio::test]
    async fn direction_is_enforced() {
        let dir = tempdir().unwrap();
        let inbound = Channel::create("output", Direction::Inbound, dir.path()).unwrap();
        let outbound = Channel::create("tokens", Direction::Outbound, dir.path()).unwrap();

        assert!(matches!(
            inbound.write(b"x").await.unwrap_err(),
            ChannelError::Unsupported(Direction::Inbound)
        ));
        let mut buf = [0u8; 4];
        assert!(matches!(
            outbound.try_read(&mut buf).await.unwrap_err(),
            ChannelError::Unsupported(Direction::Outbound)
        ));
        assert!(matches!(
            outbound.worker_stdio().await.unwrap_err(),
            ChannelError::Unsupported(Direction::Outbound)
        ));
    }

    #[tokio::test]
    async fn worker_stdio_carries_child_output() {
        let dir = tempdir().unwrap();
        let ch = Channel::create("output", Direction::Inbound, dir.path()).unwrap();

        let (stdout, stderr) = ch.worker_stdio().await.unwrap();
        assert_eq!(ch.state().await, ConnectionState::Connected);

        let mut child = tokio::process::Command::new("echo")
            .arg("hello")
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .unwrap();
        child.wait().await.unwrap();

        let mut collected = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            match ch.try_read(&mut buf).await {
                Ok(Some(n)) => collected.extend_from_slice(&buf[..n]),
                Ok(None) => tokio::time::sleep(Duration::from_millis(5)).await,
                Err(ChannelError::Disconnected) => break,
                Err(e) => panic!("unexpected channel error: {e}"),
            }
        }
        assert_eq!(collected, b"hello\n");
    }
}
