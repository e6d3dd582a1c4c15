//! Platform-specific descriptor plumbing.

#[cfg(not(target_os = "macos"))]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

#[cfg(not(target_os = "macos"))]
pub(crate) use linux::pipe_cloexec;
#[cfg(target_os = "macos")]
pub(crate) use macos::pipe_cloexec;
