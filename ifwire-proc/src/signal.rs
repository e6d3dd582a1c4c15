//! Sending signals to supervised children.

use std::fmt;
use std::io;

use crate::error::ProcError;
use crate::types::Pid;

/// A signal a supervisor sends to its child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Graceful termination request.
    Term,
    /// Forced kill; cannot be caught.
    Kill,
    Int,
    Hup,
    /// Any other signal number.
    Other(i32),
}

impl Signal {
    /// Signal number for this platform.
    pub fn to_libc(self) -> libc::c_int {
        match self {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
            Signal::Int => libc::SIGINT,
            Signal::Hup => libc::SIGHUP,
            Signal::Other(n) => n,
        }
    }

    /// Map a raw number back, e.g. from a wait status.
    pub fn from_raw(n: libc::c_int) -> Self {
        match n {
            libc::SIGTERM => Signal::Term,
            libc::SIGKILL => Signal::Kill,
            libc::SIGINT => Signal::Int,
            libc::SIGHUP => Signal::Hup,
            n => Signal::Other(n),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Term => f.write_str("SIGTERM"),
            Signal::Kill => f.write_str("SIGKILL"),
            Signal::Int => f.write_str("SIGINT"),
            Signal::Hup => f.write_str("SIGHUP"),
            Signal::Other(n) => write!(f, "signal {n}"),
        }
    }
}

/// Deliver `sig` to `pid`.
///
/// Callers must only target children they have not reaped yet; a reaped
/// pid may already belong to an unrelated process.
pub fn signal_pid(pid: Pid, sig: Signal) -> Result<(), ProcError> {
    if pid.as_raw() <= 0 {
        return Err(ProcError::InvalidArgument(format!(
            "refusing to signal pid {pid}"
        )));
    }

    tracing::trace!(pid = pid.as_raw(), signal = %sig, "sending signal");
    if unsafe { libc::kill(pid.as_raw(), sig.to_libc()) } != 0 {
        return Err(ProcError::Signal(io::Error::last_os_error()));
    }
    Ok(())
}
