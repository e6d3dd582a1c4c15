//! Command jobs: a resource acquired by one command and released by another.

mod builders;
mod job;

use ifwire_proc::{Process, SpawnSpec};

use crate::error::ModuleError;

pub use builders::{Ipv4AddrCommand, RunCommand};
pub use job::{CommandJob, JobState};

/// A full command line; the first element is the executable path.
pub type Cmdline = Vec<String>;

/// Produces the acquire and release commands of a job.
pub trait CommandBuilder {
    /// Command that acquires the resource, or releases it when `remove` is
    /// set. `None` means there is nothing to run for that phase.
    fn build(&self, remove: bool) -> Result<Option<Cmdline>, ModuleError>;
}

impl<F> CommandBuilder for F
where
    F: Fn(bool) -> Result<Option<Cmdline>, ModuleError>,
{
    fn build(&self, remove: bool) -> Result<Option<Cmdline>, ModuleError> {
        self(remove)
    }
}

/// Start `cmdline` with inherited standard descriptors.
pub(crate) fn spawn_cmdline(module: &str, cmdline: &[String]) -> Result<Process, ModuleError> {
    let spec = SpawnSpec::from_argv(cmdline).map_err(|e| ModuleError::spawn(module, e))?;
    Process::spawn(spec).map_err(|e| ModuleError::spawn(module, e))
}
