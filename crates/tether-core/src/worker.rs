//! Worker process lifecycle
//!
//! The supervisor owns exactly one worker for its whole run. The worker is
//! spawned with the two channel socket paths on its command line and its
//! standard streams wired to the output channel.

use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::{SupervisorConfig, SupervisorError, SupervisorResult};

/// Lifecycle state of the worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Process exists but liveness has not been confirmed yet
    Spawned,
    /// Worker connected to the control channel
    Running,
    /// Exit status collected
    Exited(i32),
}

/// The supervised worker process.
#[derive(Debug)]
pub struct WorkerProcess {
    child: Child,
    pid: Option<u32>,
    state: WorkerState,
}

impl WorkerProcess {
    /// Spawn the worker.
    ///
    /// Command line: `<worker> <script> --output-pipe <path>
    /// --shutdown-pipe <path> [extra args…]`. The provided stdio handles
    /// come from the output channel so everything the worker prints lands
    /// there.
    pub fn spawn(
        config: &SupervisorConfig,
        output_pipe: &str,
        shutdown_pipe: &str,
        stdout: Stdio,
        stderr: Stdio,
    ) -> SupervisorResult<Self> {
        let mut cmd = Command::new(&config.worker);
        cmd.arg(&config.script)
            .arg("--output-pipe")
            .arg(output_pipe)
            .arg("--shutdown-pipe")
            .arg(shutdown_pipe)
            .args(&config.worker_args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);

        let child = cmd.spawn().map_err(|e| SupervisorError::Spawn {
            worker: config.worker.clone(),
            source: e,
        })?;

        let pid = child.id();
        debug!(pid = ?pid, worker = %config.worker.display(), "worker spawned");

        Ok(Self {
            child,
            pid,
            state: WorkerState::Spawned,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Record that the worker proved liveness by connecting to the control
    /// channel.
    pub fn mark_running(&mut self) {
        if self.state == WorkerState::Spawned {
            self.state = WorkerState::Running;
        }
    }

    /// Non-blocking exit check. Returns the exit code once the worker has
    /// terminated, `None` while it is still running.
    pub fn try_wait(&mut self) -> SupervisorResult<Option<i32>> {
        if let WorkerState::Exited(code) = self.state {
            return Ok(Some(code));
        }

        match self.child.try_wait().map_err(SupervisorError::Wait)? {
            Some(status) => {
                let code = exit_code_of(status);
                self.state = WorkerState::Exited(code);
                Ok(Some(code))
            }
            None => Ok(None),
        }
    }

    /// Blocking wait for the worker's final exit code.
    pub async fn wait(&mut self) -> SupervisorResult<i32> {
        if let WorkerState::Exited(code) = self.state {
            return Ok(code);
        }

        let status = self.child.wait().await.map_err(SupervisorError::Wait)?;
        let code = exit_code_of(status);
        self.state = WorkerState::Exited(code);
        Ok(code)
    }
}

/// Map an exit status to the code the supervisor propagates.
/// Signal deaths use the shell convention of 128 + signal number.
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }

    -1
}
