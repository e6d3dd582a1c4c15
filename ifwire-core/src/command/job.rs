//! Acquire/release state machine.

use std::fmt;

use ifwire_proc::{ExitStatus, Process};

use super::{spawn_cmdline, CommandBuilder};
use crate::error::ModuleError;
use crate::event::{Mailbox, ModuleEvent};

/// Lifecycle of a command job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// The acquire command is running.
    Adding,
    /// The acquire command is running and release was already requested.
    AddingNeedRelease,
    /// Acquired; nothing is running.
    Active,
    /// The release command is running.
    Releasing,
    /// Terminal.
    Dead,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Dead)
    }
}

/// A resource that one command acquires and another releases.
///
/// Release never starts before the acquire command has exited
/// successfully. Dropping the job kills and reaps whatever command is
/// running.
pub struct CommandJob {
    module: &'static str,
    builder: Box<dyn CommandBuilder>,
    state: JobState,
    process: Option<Process>,
    mailbox: Mailbox,
}

impl CommandJob {
    /// Start the acquire command.
    pub fn new(
        module: &'static str,
        builder: impl CommandBuilder + 'static,
    ) -> Result<Self, ModuleError> {
        let cmdline = builder
            .build(false)?
            .ok_or_else(|| ModuleError::config(module, "no acquire command"))?;
        let process = spawn_cmdline(module, &cmdline)?;

        tracing::info!(module, pid = process.pid().as_raw(), "acquiring");

        Ok(Self {
            module,
            builder: Box::new(builder),
            state: JobState::Adding,
            process: Some(process),
            mailbox: Mailbox::default(),
        })
    }

    pub fn module(&self) -> &'static str {
        self.module
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// The command currently running, if any.
    pub fn process(&self) -> Option<&Process> {
        self.process.as_ref()
    }

    /// Request release. Takes effect once the acquire command has finished;
    /// repeated requests are ignored.
    pub fn die(&mut self) {
        match self.state {
            JobState::Adding => {
                tracing::debug!(module = self.module, "release requested while acquiring");
                self.state = JobState::AddingNeedRelease;
            }
            JobState::Active => self.start_release(),
            JobState::AddingNeedRelease | JobState::Releasing | JobState::Dead => {
                tracing::debug!(module = self.module, state = ?self.state, "release already requested");
            }
        }
    }

    /// Wait for the next owner notification.
    ///
    /// Returns `None` once `Dead` has been delivered. Cancel safe.
    pub async fn next_event(&mut self) -> Option<ModuleEvent> {
        loop {
            if let Some(event) = self.mailbox.take() {
                return Some(event);
            }
            if self.mailbox.is_dead() {
                return None;
            }

            let Some(process) = self.process.as_mut() else {
                // Active: nothing happens until release is requested
                std::future::pending::<()>().await;
                continue;
            };

            match process.exited().await {
                Ok(status) => {
                    self.process = None;
                    self.on_exit(status);
                }
                Err(e) => {
                    tracing::error!(module = self.module, error = %e, "lost track of command");
                    self.finish(true);
                }
            }
        }
    }

    fn on_exit(&mut self, status: ExitStatus) {
        let ok = status.success();
        if !ok {
            tracing::error!(module = self.module, state = ?self.state, %status, "command failed");
        }

        match self.state {
            JobState::Adding if ok => {
                tracing::info!(module = self.module, "acquired");
                self.state = JobState::Active;
                self.mailbox.post(ModuleEvent::Up);
            }
            JobState::AddingNeedRelease if ok => {
                tracing::info!(module = self.module, "acquired, releasing");
                self.start_release();
            }
            JobState::Adding | JobState::AddingNeedRelease => self.finish(true),
            JobState::Releasing => {
                if ok {
                    tracing::info!(module = self.module, "released");
                }
                self.finish(!ok);
            }
            JobState::Active | JobState::Dead => {
                tracing::warn!(module = self.module, state = ?self.state, "exit with no command running");
            }
        }
    }

    fn start_release(&mut self) {
        let cmdline = match self.builder.build(true) {
            Ok(Some(cmdline)) => cmdline,
            Ok(None) => {
                tracing::info!(module = self.module, "nothing to release");
                self.finish(false);
                return;
            }
            Err(e) => {
                tracing::error!(module = self.module, error = %e, "failed to build release command");
                self.finish(true);
                return;
            }
        };

        match spawn_cmdline(self.module, &cmdline) {
            Ok(process) => {
                tracing::info!(module = self.module, pid = process.pid().as_raw(), "releasing");
                self.process = Some(process);
                self.state = JobState::Releasing;
            }
            Err(e) => {
                tracing::error!(module = self.module, error = %e, "failed to start release command");
                self.finish(true);
            }
        }
    }

    fn finish(&mut self, error: bool) {
        self.state = JobState::Dead;
        self.process = None;
        self.mailbox.post(ModuleEvent::Dead { error });
    }
}

impl fmt::Debug for CommandJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandJob")
            .field("module", &self.module)
            .field("state", &self.state)
            .field("process", &self.process)
            .finish()
    }
}
