//! Process supervision error types.

use std::io;

/// Errors from spawning, signalling or reaping a child.
#[derive(Debug, thiserror::Error)]
pub enum ProcError {
    /// pipe() failed.
    #[error("pipe creation failed: {0}")]
    Pipe(#[source] io::Error),

    /// fork() failed.
    #[error("fork failed: {0}")]
    Fork(#[source] io::Error),

    /// The child could not exec the program (missing, not executable, bad
    /// descriptor redirection).
    #[error("exec of {program} failed: {source}")]
    Exec {
        program: String,
        #[source]
        source: io::Error,
    },

    /// kill() failed, typically because the pid is gone.
    #[error("signal failed: {0}")]
    Signal(#[source] io::Error),

    /// waitpid() failed.
    #[error("waitpid failed: {0}")]
    Wait(#[source] io::Error),

    /// Registering for SIGCHLD delivery failed, or the stream ended.
    #[error("child exit watch failed: {0}")]
    Watch(#[source] io::Error),

    /// Unusable command line (empty, or containing NUL bytes) or pid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
