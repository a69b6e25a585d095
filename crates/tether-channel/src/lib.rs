//! Inter-process channels for tether
//!
//! Provides:
//! - Named byte-stream endpoints over Unix domain sockets
//! - Non-blocking reads and best-effort writes
//! - Idempotent close, safe to call from more than one holder
//! - The control-channel token protocol (heartbeat, shutdown)

mod endpoint;
mod protocol;

pub use endpoint::*;
pub use protocol::*;

use thiserror::Error;

/// Channel errors
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to allocate channel endpoint: {0}")]
    Create(#[source] std::io::Error),

    #[error("peer did not connect within {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("channel is closed")]
    Closed,

    #[error("channel has no connected peer")]
    NotConnected,

    #[error("peer disconnected")]
    Disconnected,

    #[error("channel IO error: {0}")]
    Io(#[source] std::io::Error),

    #[error("operation not supported on a {0:?} channel")]
    Unsupported(Direction),
}

pub type ChannelResult<T> = Result<T, ChannelError>;
