//! Running module instances.

use crate::command::CommandJob;
use crate::error::ModuleError;
use crate::event::ModuleEvent;
use crate::line_event::LineEventModule;

/// A module instance as seen by its owner.
#[derive(Debug)]
pub enum Instance {
    CommandJob(CommandJob),
    LineEvent(LineEventModule),
    /// Instantiation failed; nothing was started.
    Failed(Failed),
}

/// Instance whose construction failed. Reports `Dead { error: true }` once.
#[derive(Debug)]
pub struct Failed {
    error: ModuleError,
    reported: bool,
}

impl Instance {
    pub(crate) fn failed(error: ModuleError) -> Self {
        tracing::error!(module = error.module(), error = %error, "instantiation failed");
        Self::Failed(Failed {
            error,
            reported: false,
        })
    }

    /// The error that failed instantiation, if it failed.
    pub fn failure(&self) -> Option<&ModuleError> {
        match self {
            Self::Failed(failed) => Some(&failed.error),
            _ => None,
        }
    }

    /// Request termination. The outcome arrives as a `Dead` event.
    pub fn die(&mut self) {
        match self {
            Self::CommandJob(job) => job.die(),
            Self::LineEvent(module) => module.die(),
            Self::Failed(_) => {}
        }
    }

    /// Wait for the next owner notification; `None` after `Dead`.
    ///
    /// Cancel safe.
    pub async fn next_event(&mut self) -> Option<ModuleEvent> {
        match self {
            Self::CommandJob(job) => job.next_event().await,
            Self::LineEvent(module) => module.next_event().await,
            Self::Failed(failed) => {
                if failed.reported {
                    None
                } else {
                    failed.reported = true;
                    Some(ModuleEvent::Dead { error: true })
                }
            }
        }
    }
}
