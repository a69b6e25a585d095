//! Core supervision engine for tether
//!
//! This crate wires a single worker process to the supervising host:
//! - `WorkerProcess`: spawn, poll, and reap the worker
//! - `OutputRelay`: forward the worker's output channel to the host sink
//! - `HeartbeatEmitter`: periodic liveness token toward the worker
//! - `ShutdownBridge`: termination signals become a graceful shutdown request
//! - `ProcessSupervisor`: the run loop tying it all together
//! - `SupervisorConfig`: tunables, with optional TOML file loading

mod config;
mod error;
mod heartbeat;
mod relay;
mod shutdown;
mod supervisor;
mod worker;

pub use config::*;
pub use error::*;
pub use heartbeat::*;
pub use relay::*;
pub use shutdown::*;
pub use supervisor::*;
pub use worker::*;
