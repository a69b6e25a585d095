//! Error types for the supervision engine

use std::path::PathBuf;
use thiserror::Error;

use tether_channel::ChannelError;

/// Fatal supervision errors.
///
/// Every variant aborts the invocation; the launcher maps them to a nonzero
/// process status. Heartbeat-write failures are deliberately absent: they
/// are logged and retried on the next tick. A shutdown-token write failure
/// is swallowed entirely since the host is already terminating.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to create {name} channel: {source}")]
    ChannelCreation {
        name: &'static str,
        #[source]
        source: ChannelError,
    },

    #[error("worker never connected to the {name} channel: {source}")]
    ChannelConnection {
        name: &'static str,
        #[source]
        source: ChannelError,
    },

    #[error("failed to spawn worker {}: {source}", .worker.display())]
    Spawn {
        worker: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install signal handlers: {0}")]
    SignalHandler(#[source] std::io::Error),

    #[error("failed to collect worker exit status: {0}")]
    Wait(#[source] std::io::Error),
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
