//! Reaping children and decoding their exit outcome.

use std::fmt;
use std::io;

use crate::error::ProcError;
use crate::signal::Signal;
use crate::types::Pid;

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal exit with this status code.
    Code(i32),
    /// Abnormal termination by this signal number.
    Signaled(i32),
}

impl ExitStatus {
    /// Normal exit with status 0.
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }

    /// Exited on its own rather than by a signal.
    pub fn is_normal(&self) -> bool {
        matches!(self, ExitStatus::Code(_))
    }

    pub fn code(&self) -> Option<i32> {
        match *self {
            ExitStatus::Code(c) => Some(c),
            ExitStatus::Signaled(_) => None,
        }
    }

    pub fn signal(&self) -> Option<i32> {
        match *self {
            ExitStatus::Signaled(s) => Some(s),
            ExitStatus::Code(_) => None,
        }
    }

    fn from_raw(status: libc::c_int) -> Self {
        if libc::WIFSIGNALED(status) {
            ExitStatus::Signaled(libc::WTERMSIG(status))
        } else {
            // Stop/continue reports need WUNTRACED/WCONTINUED, which are
            // never passed, so anything else is a normal exit.
            ExitStatus::Code(libc::WEXITSTATUS(status))
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ExitStatus::Code(c) => write!(f, "exit status {c}"),
            ExitStatus::Signaled(s) => write!(f, "killed by {}", Signal::from_raw(s)),
        }
    }
}

/// waitpid() on one child, retrying on EINTR. `Ok(None)` when WNOHANG found
/// nothing to reap.
fn waitpid(pid: Pid, flags: libc::c_int) -> Result<Option<ExitStatus>, ProcError> {
    let mut status: libc::c_int = 0;
    loop {
        match unsafe { libc::waitpid(pid.as_raw(), &mut status, flags) } {
            0 => return Ok(None),
            n if n > 0 => return Ok(Some(ExitStatus::from_raw(status))),
            _ => {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::Interrupted {
                    return Err(ProcError::Wait(err));
                }
            }
        }
    }
}

/// Reap `pid` if it has exited, without blocking.
///
/// Once this returns an outcome the pid is gone and must not be waited on
/// or signalled again.
pub fn try_wait(pid: Pid) -> Result<Option<ExitStatus>, ProcError> {
    waitpid(pid, libc::WNOHANG)
}

/// Block the calling thread until `pid` exits, then reap it.
pub fn wait(pid: Pid) -> Result<ExitStatus, ProcError> {
    loop {
        if let Some(status) = waitpid(pid, 0)? {
            return Ok(status);
        }
    }
}
