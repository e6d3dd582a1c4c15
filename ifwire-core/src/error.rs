//! Module instantiation and runtime errors.

use std::io;

use ifwire_proc::ProcError;

/// Errors that fail a module instance.
///
/// Each of them ends the instance with `Dead { error: true }`; none is
/// retried.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// Bad arguments or an unknown module type. Nothing was spawned.
    #[error("{module}: {reason}")]
    Config { module: String, reason: String },

    /// The command could not be started.
    #[error("{module}: {source}")]
    Spawn {
        module: String,
        #[source]
        source: ProcError,
    },

    /// Setting up or driving a descriptor failed.
    #[error("{module}: {source}")]
    Io {
        module: String,
        #[source]
        source: io::Error,
    },
}

impl ModuleError {
    pub fn config(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            module: module.into(),
            reason: reason.into(),
        }
    }

    pub fn spawn(module: impl Into<String>, source: ProcError) -> Self {
        Self::Spawn {
            module: module.into(),
            source,
        }
    }

    pub fn io(module: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            module: module.into(),
            source,
        }
    }

    /// Name of the module type the error belongs to.
    pub fn module(&self) -> &str {
        match self {
            Self::Config { module, .. } | Self::Spawn { module, .. } | Self::Io { module, .. } => {
                module
            }
        }
    }
}
