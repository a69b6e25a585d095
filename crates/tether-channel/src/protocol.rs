//! Control-channel wire protocol
//!
//! Tokens are newline-terminated ASCII lines, written by the supervisor and
//! read by the worker. Two tokens exist: a periodic liveness signal and an
//! at-most-once graceful-termination request. The output channel carries no
//! framing at all; it is a raw byte stream.

/// Periodic liveness token, supervisor to worker.
pub const HEARTBEAT_TOKEN: &[u8] = b"HEARTBEAT\n";

/// Graceful-termination token, written at most once per supervisor lifetime.
pub const SHUTDOWN_TOKEN: &[u8] = b"shutdown\n";

/// A parsed control-channel token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlToken {
    Heartbeat,
    Shutdown,
}

impl ControlToken {
    /// Parse a single line (without requiring the trailing newline).
    /// Unknown lines yield `None`; readers should skip them.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim_end_matches(['\r', '\n']) {
            "HEARTBEAT" => Some(Self::Heartbeat),
            "shutdown" => Some(Self::Shutdown),
            _ => None,
        }
    }

    /// Wire form of the token, newline included.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Heartbeat => HEARTBEAT_TOKEN,
            Self::Shutdown => SHUTDOWN_TOKEN,
        }
    }
}
