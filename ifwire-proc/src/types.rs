//! Core types for process supervision.

use std::fmt;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

/// Process ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub i32);

impl Pid {
    /// Create a new Pid.
    pub fn new(pid: i32) -> Self {
        Self(pid)
    }

    /// Get the raw pid value.
    pub fn as_raw(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A descriptor handed to the child at a fixed descriptor number.
///
/// The parent's copy is closed once the spawn attempt is over, whether it
/// succeeded or not.
pub struct Redirect {
    /// Descriptor in the parent.
    pub fd: OwnedFd,
    /// Descriptor number the child sees it as.
    pub target: RawFd,
}

impl fmt::Debug for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redirect")
            .field("fd", &self.fd.as_raw_fd())
            .field("target", &self.target)
            .finish()
    }
}
