//! Process supervisor
//!
//! Owns the whole invocation: channel setup, worker spawn, the run loop,
//! and exit-code propagation. The run loop is a timer-driven select over a
//! short poll tick (output drain + exit check) and the heartbeat interval;
//! the shutdown bridge runs as its own task and only shares the control
//! channel handle.

use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use tether_channel::{Channel, ChannelError, Direction};

use crate::{
    DrainOutcome, HeartbeatEmitter, OutputRelay, ShutdownBridge, SupervisorConfig,
    SupervisorError, SupervisorResult, WorkerProcess,
};

/// Name prefix of the channel carrying worker output
pub const OUTPUT_CHANNEL_PREFIX: &str = "output";

/// Name prefix of the channel carrying heartbeat and shutdown tokens
pub const CONTROL_CHANNEL_PREFIX: &str = "control";

/// Supervision phases, in the order a successful run passes through them.
/// The three failure states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Init,
    ChannelsCreated,
    WorkerSpawned,
    AwaitingConnections,
    Running,
    Draining,
    Terminated,
    ChannelCreationFailed,
    SpawnFailed,
    ConnectionFailed,
}

/// Supervises a single worker process from spawn to exit.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    state: SupervisorState,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            state: SupervisorState::Init,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    fn set_state(&mut self, next: SupervisorState) {
        debug!(from = ?self.state, to = ?next, "supervisor state");
        self.state = next;
    }

    /// Run the worker to completion, relaying its output to stdout, and
    /// return its exit code.
    pub async fn run(&mut self) -> SupervisorResult<i32> {
        self.run_with_sink(tokio::io::stdout()).await
    }

    /// Like [`run`](Self::run) with an explicit host output sink.
    pub async fn run_with_sink<W: AsyncWrite + Unpin>(
        &mut self,
        sink: W,
    ) -> SupervisorResult<i32> {
        // Channel setup. Nothing is spawned until both endpoints exist.
        let output = match Channel::create(
            OUTPUT_CHANNEL_PREFIX,
            Direction::Inbound,
            &self.config.runtime_dir,
        ) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                self.set_state(SupervisorState::ChannelCreationFailed);
                return Err(SupervisorError::ChannelCreation {
                    name: "output",
                    source: e,
                });
            }
        };

        let control = match Channel::create(
            CONTROL_CHANNEL_PREFIX,
            Direction::Duplex,
            &self.config.runtime_dir,
        ) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                self.set_state(SupervisorState::ChannelCreationFailed);
                output.close().await;
                return Err(SupervisorError::ChannelCreation {
                    name: "control",
                    source: e,
                });
            }
        };

        self.set_state(SupervisorState::ChannelsCreated);

        // Wire the worker's standard streams to the output channel, then
        // spawn with both socket paths on the command line
        let (stdout, stderr) = match output.worker_stdio().await {
            Ok(pair) => pair,
            Err(e) => {
                self.set_state(SupervisorState::ChannelCreationFailed);
                output.close().await;
                control.close().await;
                return Err(SupervisorError::ChannelCreation {
                    name: "output",
                    source: e,
                });
            }
        };

        let output_pipe = output.path().to_string_lossy().into_owned();
        let control_pipe = control.path().to_string_lossy().into_owned();

        let mut worker = match WorkerProcess::spawn(
            &self.config,
            &output_pipe,
            &control_pipe,
            stdout,
            stderr,
        ) {
            Ok(w) => w,
            Err(e) => {
                self.set_state(SupervisorState::SpawnFailed);
                output.close().await;
                control.close().await;
                return Err(e);
            }
        };

        self.set_state(SupervisorState::WorkerSpawned);
        info!(
            pid = ?worker.id(),
            worker = %self.config.worker.display(),
            script = %self.config.script.display(),
            "worker spawned"
        );

        // The output channel connected when the stdio handles were made;
        // the control channel confirms the worker actually came up. A
        // worker that dies first counts as a failed connection.
        self.set_state(SupervisorState::AwaitingConnections);
        let connected = tokio::select! {
            biased;
            res = control.await_peer(self.config.connect_timeout) => res,
            _ = worker.wait() => Err(ChannelError::Disconnected),
        };
        if let Err(e) = connected {
            self.set_state(SupervisorState::ConnectionFailed);
            warn!(
                error = %e,
                "worker never connected to the control channel; it may still be running"
            );
            output.close().await;
            control.close().await;
            return Err(SupervisorError::ChannelConnection {
                name: "control",
                source: e,
            });
        }
        worker.mark_running();

        let bridge = ShutdownBridge::new(control.clone());
        let signal_task = match bridge.install() {
            Ok(handle) => handle,
            Err(e) => {
                output.close().await;
                control.close().await;
                return Err(SupervisorError::SignalHandler(e));
            }
        };

        self.set_state(SupervisorState::Running);
        info!(pid = ?worker.id(), "worker running, supervision started");

        let mut relay = OutputRelay::new(output.clone(), sink);
        let mut heartbeat = HeartbeatEmitter::new(control.clone());

        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First heartbeat one full interval in, not at startup
        let mut beat = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );
        beat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut exit_code = None;
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    match relay.drain().await {
                        Ok(DrainOutcome::PeerClosed) => {
                            debug!("output stream ended");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "output relay failed, draining");
                            break;
                        }
                    }

                    match worker.try_wait() {
                        Ok(Some(code)) => {
                            exit_code = Some(code);
                            break;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            signal_task.abort();
                            output.close().await;
                            control.close().await;
                            return Err(e);
                        }
                    }
                }
                _ = beat.tick() => heartbeat.beat().await,
            }
        }

        // Pick up whatever the worker managed to write before exiting
        self.set_state(SupervisorState::Draining);
        if let Err(e) = relay.drain().await {
            debug!(error = %e, "final drain stopped");
        }

        let code = match exit_code {
            Some(code) => code,
            None => match worker.wait().await {
                Ok(code) => code,
                Err(e) => {
                    signal_task.abort();
                    output.close().await;
                    control.close().await;
                    return Err(e);
                }
            },
        };

        self.set_state(SupervisorState::Terminated);
        debug!(
            bytes = relay.bytes_forwarded(),
            heartbeats = heartbeat.sent(),
            shutdown_requested = bridge.fired(),
            "run loop finished"
        );

        signal_task.abort();
        output.close().await;
        control.close().await;

        if code == 0 {
            info!("worker completed successfully");
        } else {
            error!(code, "worker exited with error");
        }
        Ok(code)
    }
}
