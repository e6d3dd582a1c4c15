//! macOS implementation; no pipe2(), so FD_CLOEXEC is set afterwards.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

/// Create a pipe whose both ends are close-on-exec.
///
/// Returns `(read, write)`. There is a window between pipe() and fcntl()
/// where a concurrent fork could inherit the descriptors.
pub(crate) fn pipe_cloexec() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds: [libc::c_int; 2] = [-1, -1];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    // Safety: pipe succeeded, so both fds are open and owned by us
    let read = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    let write = unsafe { OwnedFd::from_raw_fd(fds[1]) };

    for fd in [&read, &write] {
        if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok((read, write))
}
