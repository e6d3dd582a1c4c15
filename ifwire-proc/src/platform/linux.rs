//! Linux implementation using pipe2().

use std::io;
use std::os::fd::{FromRawFd, OwnedFd};

/// Create a pipe whose both ends are close-on-exec.
///
/// Returns `(read, write)`.
pub(crate) fn pipe_cloexec() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds: [libc::c_int; 2] = [-1, -1];
    let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    // Safety: pipe2 succeeded, so both fds are open and owned by us
    let read = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    let write = unsafe { OwnedFd::from_raw_fd(fds[1]) };
    Ok((read, write))
}
