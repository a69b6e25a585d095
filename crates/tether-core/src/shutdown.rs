//! Shutdown signal bridge
//!
//! Turns host termination notifications (SIGINT, SIGTERM, SIGHUP) into a
//! single best-effort shutdown token on the control channel. Delivery is
//! advisory: nothing is awaited or acknowledged, and the worker may or may
//! not act on it before the host tears the supervisor down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use tether_channel::{Channel, ControlToken};

/// Forwards termination notifications to the worker.
///
/// Cloning shares the single-delivery latch: however many clones exist and
/// however many notifications arrive, at most one shutdown token is ever
/// written, and no write is attempted after the control channel closes.
#[derive(Clone)]
pub struct ShutdownBridge {
    control: Arc<Channel>,
    fired: Arc<AtomicBool>,
}

impl ShutdownBridge {
    pub fn new(control: Arc<Channel>) -> Self {
        Self {
            control,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register signal handlers and spawn the listener task.
    ///
    /// The task keeps consuming notifications after the first one so that
    /// repeated interrupts stay latched instead of killing the supervisor
    /// mid-drain. The caller aborts the task when supervision ends.
    pub fn install(&self) -> std::io::Result<JoinHandle<()>> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;

        let bridge = self.clone();
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sigint.recv() => debug!("received SIGINT"),
                    _ = sigterm.recv() => debug!("received SIGTERM"),
                    _ = sighup.recv() => debug!("received SIGHUP"),
                }
                bridge.trigger().await;
            }
        }))
    }

    /// Deliver the shutdown token and close the control channel.
    ///
    /// First caller wins; every later call is a no-op. A failed token
    /// write is swallowed since the host is already terminating.
    pub async fn trigger(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("termination notification received, requesting worker shutdown");
        if let Err(e) = self.control.write(ControlToken::Shutdown.as_bytes()).await {
            debug!(error = %e, "shutdown token write failed");
        }
        self.control.close().await;
    }

    /// Whether a termination notification has been seen.
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}
