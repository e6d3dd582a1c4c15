//! Process supervision for ifwire.
//!
//! This crate wraps fork/exec, descriptor redirection, signalling and exit
//! reaping for single child processes. Exit outcomes are delivered through
//! the tokio reactor (SIGCHLD), never synchronously with spawn or signal
//! calls.
//!
//! # Example
//!
//! ```no_run
//! use ifwire_proc::{pipe, Process, SpawnSpec};
//!
//! # async fn demo() -> Result<(), ifwire_proc::ProcError> {
//! let (_read, write) = pipe()?;
//! let spec = SpawnSpec::from_argv(&["/bin/sh", "-c", "echo hello"])?.redirect(write, 1);
//!
//! let mut child = Process::spawn(spec)?;
//! let status = child.exited().await?;
//! assert!(status.success());
//! # Ok(())
//! # }
//! ```

mod error;
mod platform;
mod process;
mod signal;
mod spawn;
mod types;
mod wait;

use std::os::fd::OwnedFd;

// Re-export public API
pub use error::ProcError;
pub use process::Process;
pub use signal::{signal_pid, Signal};
pub use spawn::SpawnSpec;
pub use types::{Pid, Redirect};
pub use wait::{try_wait, wait, ExitStatus};

/// Create a close-on-exec pipe, returning `(read, write)`.
///
/// Hand the write end to [`SpawnSpec::redirect`] to capture a child's
/// output; the redirected copy in the child is not close-on-exec.
pub fn pipe() -> Result<(OwnedFd, OwnedFd), ProcError> {
    platform::pipe_cloexec().map_err(ProcError::Pipe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::fs::File;
    use std::io::Read;
    use std::time::Duration;

    fn sh(script: &str) -> SpawnSpec {
        SpawnSpec::from_argv(&["/bin/sh", "-c", script]).unwrap()
    }

    #[test]
    fn test_signal_numbers_round_trip() {
        for sig in [Signal::Term, Signal::Kill, Signal::Int, Signal::Hup, Signal::Other(42)] {
            assert_eq!(Signal::from_raw(sig.to_libc()), sig);
        }
        assert_eq!(Signal::Term.to_libc(), libc::SIGTERM);
        assert_eq!(Signal::Kill.to_string(), "SIGKILL");
        assert_eq!(Signal::Other(42).to_string(), "signal 42");
    }

    #[test]
    fn test_signal_refuses_group_pids() {
        for raw in [0, -1] {
            let err = signal_pid(Pid::new(raw), Signal::Term).unwrap_err();
            assert!(matches!(err, ProcError::InvalidArgument(_)));
        }
    }

    #[test]
    fn test_exit_status_code() {
        let status = ExitStatus::Code(0);
        assert!(status.success());
        assert!(status.is_normal());
        assert_eq!(status.code(), Some(0));
        assert_eq!(status.signal(), None);

        let status = ExitStatus::Code(1);
        assert!(!status.success());
        assert!(status.is_normal());
        assert_eq!(status.code(), Some(1));
    }

    #[test]
    fn test_exit_status_signaled() {
        let status = ExitStatus::Signaled(libc::SIGTERM);
        assert!(!status.success());
        assert!(!status.is_normal());
        assert_eq!(status.code(), None);
        assert_eq!(status.signal(), Some(libc::SIGTERM));
        assert_eq!(status.to_string(), "killed by SIGTERM");
        assert_eq!(ExitStatus::Code(3).to_string(), "exit status 3");
    }

    #[test]
    fn test_spawn_spec_from_argv() {
        let spec = SpawnSpec::from_argv(&["/bin/echo", "a", "b"]).unwrap();
        assert_eq!(spec.program, CString::new("/bin/echo").unwrap());
        assert_eq!(spec.args.len(), 3);
        assert_eq!(spec.args[0], CString::new("/bin/echo").unwrap());
        assert!(spec.redirects.is_empty());
    }

    #[test]
    fn test_spawn_spec_rejects_empty_argv() {
        let argv: [&str; 0] = [];
        let err = SpawnSpec::from_argv(&argv).unwrap_err();
        assert!(matches!(err, ProcError::InvalidArgument(_)));
    }

    #[test]
    fn test_spawn_spec_rejects_nul() {
        let err = SpawnSpec::from_argv(&["/bin/echo", "a\0b"]).unwrap_err();
        assert!(matches!(err, ProcError::InvalidArgument(_)));
    }

    #[test]
    fn test_spawn_true() {
        let mut child = Process::spawn(sh("exit 0")).unwrap();
        let status = child.force_kill().unwrap();
        // Either it exited before the kill landed or it was killed
        assert!(status.success() || status.signal() == Some(libc::SIGKILL));
    }

    #[test]
    fn test_spawn_nonexistent() {
        let spec = SpawnSpec::from_argv(&["/nonexistent/path/to/program"]).unwrap();
        match Process::spawn(spec) {
            Err(ProcError::Exec { program, source }) => {
                assert_eq!(program, "/nonexistent/path/to/program");
                assert_eq!(source.raw_os_error(), Some(libc::ENOENT));
            }
            other => panic!("expected exec error, got {:?}", other.map(|p| p.pid())),
        }
    }

    #[test]
    fn test_wait_blocking_exit_code() {
        let (read, write) = pipe().unwrap();
        let child = Process::spawn(sh("exit 3").redirect(write, 1)).unwrap();

        // EOF on the pipe means the child is on its way out
        let mut sink = Vec::new();
        File::from(read).read_to_end(&mut sink).unwrap();

        let status = wait(child.pid()).unwrap();
        assert_eq!(status, ExitStatus::Code(3));
        // Reaped behind the handle's back, so its drop must not run
        std::mem::forget(child);
    }

    #[test]
    fn test_redirect_stdout_to_pipe() {
        let (read, write) = pipe().unwrap();
        let mut child = Process::spawn(sh("echo hello").redirect(write, 1)).unwrap();
        assert_eq!(child.redirected(), &[1]);

        let mut output = String::new();
        File::from(read).read_to_string(&mut output).unwrap();
        assert_eq!(output, "hello\n");

        let status = child.force_kill().unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_redirect_swapped_descriptors() {
        // Two pipes installed crosswise on 3 and 4; sources may sit on the
        // very numbers being targeted.
        let (read_a, write_a) = pipe().unwrap();
        let (read_b, write_b) = pipe().unwrap();
        let spec = sh("echo a >&3; echo b >&4")
            .redirect(write_a, 4)
            .redirect(write_b, 3);
        let mut child = Process::spawn(spec).unwrap();

        let mut a = String::new();
        let mut b = String::new();
        File::from(read_a).read_to_string(&mut a).unwrap();
        File::from(read_b).read_to_string(&mut b).unwrap();
        assert_eq!(a, "b\n");
        assert_eq!(b, "a\n");

        child.force_kill().unwrap();
    }

    #[test]
    fn test_exec_failure_reported_when_target_hits_error_pipe() {
        use std::os::fd::AsRawFd;

        let (_read, write) = pipe().unwrap();

        // spawn opens its error pipe on the lowest free numbers; find them
        let (probe_read, probe_write) = pipe().unwrap();
        let err_write = probe_write.as_raw_fd();
        drop(probe_read);
        drop(probe_write);

        let spec = SpawnSpec::from_argv(&["/nonexistent/program"])
            .unwrap()
            .redirect(write, err_write);
        match Process::spawn(spec) {
            Err(ProcError::Exec { program, .. }) => assert_eq!(program, "/nonexistent/program"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(mut child) => {
                let status = child.force_kill();
                panic!("spawn succeeded for a missing program: {status:?}");
            }
        }
    }

    #[tokio::test]
    async fn test_exited_reports_code_once() {
        let mut child = Process::spawn(sh("exit 7")).unwrap();
        let status = child.exited().await.unwrap();
        assert_eq!(status, ExitStatus::Code(7));
        assert_eq!(child.status(), Some(ExitStatus::Code(7)));

        // Recorded outcome is returned again without touching waitpid
        let again = child.exited().await.unwrap();
        assert_eq!(again, status);
    }

    #[tokio::test]
    async fn test_request_terminate() {
        let mut child = Process::spawn(sh("exec sleep 10")).unwrap();
        assert!(!child.terminate_requested());

        child.request_terminate().unwrap();
        assert!(child.terminate_requested());
        assert!(child.status().is_none());

        let status = tokio::time::timeout(Duration::from_secs(5), child.exited())
            .await
            .expect("process did not exit")
            .unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }

    #[tokio::test]
    async fn test_try_wait_running() {
        let mut child = Process::spawn(sh("exec sleep 10")).unwrap();
        assert!(child.try_wait().unwrap().is_none());

        let status = child.force_kill().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGKILL));
        assert_eq!(child.try_wait().unwrap(), Some(status));
    }

    #[test]
    fn test_drop_kills_and_reaps() {
        let child = Process::spawn(sh("exec sleep 10")).unwrap();
        let pid = child.pid();
        drop(child);

        // Reaped, so the pid no longer refers to our child
        let err = try_wait(pid).unwrap_err();
        assert!(matches!(err, ProcError::Wait(_)));
    }

    #[test]
    fn test_pid_accessors() {
        let pid = Pid::new(1234);
        assert_eq!(pid.as_raw(), 1234);
        assert_eq!(pid.0, 1234);
        assert_eq!(pid.to_string(), "1234");
    }
}
