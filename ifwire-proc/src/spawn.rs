//! Child process spawning with descriptor redirection.

use std::ffi::{CStr, CString};
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use crate::error::ProcError;
use crate::platform;
use crate::types::{Pid, Redirect};
use crate::wait;

/// Specification for spawning a child process.
#[derive(Debug)]
pub struct SpawnSpec {
    /// Path of the executable. No PATH lookup is done.
    pub program: CString,
    /// Arguments to pass, argv[0] included.
    pub args: Vec<CString>,
    /// Descriptors to install in the child.
    pub redirects: Vec<Redirect>,
}

impl SpawnSpec {
    /// Create a new SpawnSpec with the given program.
    pub fn new(program: impl Into<Vec<u8>>) -> Result<Self, ProcError> {
        let program =
            CString::new(program).map_err(|e| ProcError::InvalidArgument(e.to_string()))?;
        Ok(Self {
            program,
            args: Vec::new(),
            redirects: Vec::new(),
        })
    }

    /// Build a spec from a full command line, where `argv[0]` is the
    /// executable path.
    pub fn from_argv<S: AsRef<str>>(argv: &[S]) -> Result<Self, ProcError> {
        let program = argv
            .first()
            .ok_or_else(|| ProcError::InvalidArgument("empty command line".to_string()))?;

        let args = argv
            .iter()
            .map(|a| CString::new(a.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProcError::InvalidArgument(e.to_string()))?;

        Ok(Self::new(program.as_ref())?.args(args))
    }

    /// Set the arguments (including argv[0]).
    pub fn args(mut self, args: Vec<CString>) -> Self {
        self.args = args;
        self
    }

    /// Install `fd` in the child as descriptor number `target`.
    pub fn redirect(mut self, fd: OwnedFd, target: RawFd) -> Self {
        self.redirects.push(Redirect { fd, target });
        self
    }
}

/// Fork and exec the child described by `spec`.
///
/// Exec failures are reported back over a close-on-exec pipe, so a missing
/// executable is an error here instead of a later exit code.
pub(crate) fn spawn_child(spec: &SpawnSpec) -> Result<Pid, ProcError> {
    let (err_read, err_write) = platform::pipe_cloexec().map_err(ProcError::Pipe)?;

    // Everything the child touches is prepared before fork; the child must
    // not allocate.
    let argv: Vec<&CStr> = if spec.args.is_empty() {
        vec![spec.program.as_c_str()]
    } else {
        spec.args.iter().map(|s| s.as_c_str()).collect()
    };
    let mut argv_ptrs: Vec<*const libc::c_char> = argv.iter().map(|s| s.as_ptr()).collect();
    argv_ptrs.push(std::ptr::null());

    let sources: Vec<RawFd> = spec.redirects.iter().map(|r| r.fd.as_raw_fd()).collect();
    let targets: Vec<RawFd> = spec.redirects.iter().map(|r| r.target).collect();
    let mut scratch: Vec<RawFd> = vec![-1; sources.len()];
    let min_scratch = targets
        .iter()
        .copied()
        .max()
        .unwrap_or(libc::STDERR_FILENO)
        .max(libc::STDERR_FILENO)
        + 1;

    let pid = unsafe { libc::fork() };

    if pid < 0 {
        return Err(ProcError::Fork(io::Error::last_os_error()));
    }

    if pid == 0 {
        // === CHILD PROCESS ===
        unsafe {
            exec_child(
                &spec.program,
                &argv_ptrs,
                &sources,
                &targets,
                &mut scratch,
                min_scratch,
                err_write.as_raw_fd(),
            )
        }
    }

    // === PARENT PROCESS ===
    drop(err_write);

    let mut report = Vec::with_capacity(4);
    File::from(err_read)
        .read_to_end(&mut report)
        .map_err(ProcError::Pipe)?;

    if report.len() < 4 {
        return Ok(Pid::new(pid));
    }

    // The child already exited with 127; reap it before reporting
    let pid = Pid::new(pid);
    if let Err(e) = wait::wait(pid) {
        tracing::warn!(pid = pid.as_raw(), error = %e, "failed to reap child after exec failure");
    }

    let errno = i32::from_ne_bytes([report[0], report[1], report[2], report[3]]);
    Err(ProcError::Exec {
        program: spec.program.to_string_lossy().into_owned(),
        source: io::Error::from_raw_os_error(errno),
    })
}

/// Child side of the fork: install redirections and exec.
///
/// Only async-signal-safe calls are made here.
unsafe fn exec_child(
    program: &CStr,
    argv: &[*const libc::c_char],
    sources: &[RawFd],
    targets: &[RawFd],
    scratch: &mut [RawFd],
    min_scratch: RawFd,
    err_fd: RawFd,
) -> ! {
    // Rust ignores SIGPIPE; the child should not inherit that
    unsafe { libc::signal(libc::SIGPIPE, libc::SIG_DFL) };

    // The error pipe may sit on a target number too; move it out of the way
    // before any dup2 and report through the moved copy from here on.
    let err_fd = match unsafe { libc::fcntl(err_fd, libc::F_DUPFD_CLOEXEC, min_scratch) } {
        fd if fd >= 0 => fd,
        _ => unsafe { report_and_exit(err_fd) },
    };

    // Move every source above all targets first, so installing one target
    // cannot clobber a source that is still needed.
    for (slot, &src) in scratch.iter_mut().zip(sources) {
        let fd = unsafe { libc::fcntl(src, libc::F_DUPFD_CLOEXEC, min_scratch) };
        if fd < 0 {
            unsafe { report_and_exit(err_fd) };
        }
        *slot = fd;
    }

    for (&fd, &target) in scratch.iter().zip(targets) {
        // dup2 clears FD_CLOEXEC on the target
        if unsafe { libc::dup2(fd, target) } < 0 {
            unsafe { report_and_exit(err_fd) };
        }
    }

    unsafe { libc::execv(program.as_ptr(), argv.as_ptr()) };

    unsafe { report_and_exit(err_fd) }
}

/// Write errno to the error pipe and exit the child.
unsafe fn report_and_exit(err_fd: RawFd) -> ! {
    let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
    let bytes = errno.to_ne_bytes();
    unsafe {
        libc::write(err_fd, bytes.as_ptr().cast(), bytes.len());
        libc::_exit(127)
    }
}
