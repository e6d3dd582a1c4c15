//! Supervised process handle.

use std::io;
use std::os::fd::RawFd;

use tokio::signal::unix::{signal as watch_signal, Signal as SignalStream, SignalKind};

use crate::error::ProcError;
use crate::signal::{signal_pid, Signal};
use crate::spawn::{spawn_child, SpawnSpec};
use crate::types::Pid;
use crate::wait::{self, ExitStatus};

/// One spawned child process.
///
/// The exit outcome is recorded exactly once. Dropping a handle whose
/// process has not been reaped kills and reaps it synchronously.
pub struct Process {
    pid: Pid,
    program: String,
    redirected: Vec<RawFd>,
    status: Option<ExitStatus>,
    terminate_requested: bool,
    sigchld: Option<SignalStream>,
}

impl Process {
    /// Spawn a child process.
    ///
    /// The parent's copies of redirected descriptors are closed before this
    /// returns.
    pub fn spawn(spec: SpawnSpec) -> Result<Self, ProcError> {
        let program = spec.program.to_string_lossy().into_owned();
        let redirected = spec.redirects.iter().map(|r| r.target).collect();

        let pid = spawn_child(&spec)?;

        tracing::debug!(pid = pid.as_raw(), program = %program, "process spawned");

        Ok(Self {
            pid,
            program,
            redirected,
            status: None,
            terminate_requested: false,
            sigchld: None,
        })
    }

    /// Get the child's PID.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Executable path the process was started from.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Descriptor numbers that were redirected in the child.
    pub fn redirected(&self) -> &[RawFd] {
        &self.redirected
    }

    /// The recorded exit outcome, if the process has been reaped.
    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Whether [`Process::request_terminate`] has been called.
    pub fn terminate_requested(&self) -> bool {
        self.terminate_requested
    }

    /// Ask the process to exit with SIGTERM.
    ///
    /// Only a request: the outcome still arrives through [`Process::exited`].
    pub fn request_terminate(&mut self) -> Result<(), ProcError> {
        self.terminate_requested = true;

        // Once reaped the pid may belong to someone else
        if self.status.is_some() {
            return Ok(());
        }

        tracing::debug!(pid = self.pid.as_raw(), "requesting termination");
        signal_pid(self.pid, Signal::Term)
    }

    /// Send an arbitrary signal to the process.
    pub fn signal(&self, sig: Signal) -> Result<(), ProcError> {
        if self.status.is_some() {
            return Ok(());
        }
        signal_pid(self.pid, sig)
    }

    /// Kill the process with SIGKILL and reap it, blocking until it is gone.
    ///
    /// Meant for teardown, when the owner cannot wait for a graceful exit.
    pub fn force_kill(&mut self) -> Result<ExitStatus, ProcError> {
        if let Some(status) = self.status {
            return Ok(status);
        }

        if let Err(e) = signal_pid(self.pid, Signal::Kill) {
            tracing::warn!(pid = self.pid.as_raw(), error = %e, "SIGKILL failed");
        }

        let status = wait::wait(self.pid)?;
        tracing::debug!(pid = self.pid.as_raw(), %status, "process killed");
        self.status = Some(status);
        Ok(status)
    }

    /// Non-blocking check for the exit outcome.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>, ProcError> {
        if let Some(status) = self.status {
            return Ok(Some(status));
        }

        let status = wait::try_wait(self.pid)?;
        if let Some(status) = status {
            tracing::debug!(pid = self.pid.as_raw(), %status, "process exited");
            self.status = Some(status);
        }
        Ok(status)
    }

    /// Wait for the process to exit, driven by the reactor's SIGCHLD stream.
    ///
    /// Cancel safe. Once the outcome is known every call returns it
    /// immediately.
    pub async fn exited(&mut self) -> Result<ExitStatus, ProcError> {
        if let Some(status) = self.status {
            return Ok(status);
        }

        // Register before checking, so an exit between the check and the
        // first recv still wakes us.
        if self.sigchld.is_none() {
            self.sigchld = Some(watch_signal(SignalKind::child()).map_err(ProcError::Watch)?);
        }

        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(status);
            }

            if let Some(sigchld) = self.sigchld.as_mut() {
                if sigchld.recv().await.is_none() {
                    return Err(ProcError::Watch(io::Error::other(
                        "SIGCHLD stream closed",
                    )));
                }
            }
        }
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if self.status.is_some() {
            return;
        }

        tracing::debug!(pid = self.pid.as_raw(), program = %self.program, "killing process on drop");
        if let Err(e) = self.force_kill() {
            tracing::error!(pid = self.pid.as_raw(), error = %e, "failed to kill process on drop");
        }
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("program", &self.program)
            .field("status", &self.status)
            .field("terminate_requested", &self.terminate_requested)
            .finish()
    }
}
