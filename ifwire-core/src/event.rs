//! Notifications a module instance raises to its owner.

use std::collections::VecDeque;
use std::fmt;

/// One owner notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleEvent {
    /// The resource is up.
    Up,
    /// The resource went down but the instance is still alive.
    Down,
    /// The instance is gone. Always the last event.
    Dead { error: bool },
}

impl ModuleEvent {
    pub fn is_dead(&self) -> bool {
        matches!(self, Self::Dead { .. })
    }
}

impl fmt::Display for ModuleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
            Self::Dead { error: false } => write!(f, "dead"),
            Self::Dead { error: true } => write!(f, "dead (error)"),
        }
    }
}

/// Queue of notifications waiting to be collected by the owner.
///
/// Enforces that `Dead` is posted once and nothing follows it.
#[derive(Debug, Default)]
pub(crate) struct Mailbox {
    events: VecDeque<ModuleEvent>,
    dead: bool,
}

impl Mailbox {
    pub(crate) fn post(&mut self, event: ModuleEvent) {
        if self.dead {
            tracing::warn!(%event, "dropping event posted after dead");
            return;
        }
        self.dead = event.is_dead();
        self.events.push_back(event);
    }

    pub(crate) fn take(&mut self) -> Option<ModuleEvent> {
        self.events.pop_front()
    }

    /// Whether `Dead` has been posted, collected or not.
    pub(crate) fn is_dead(&self) -> bool {
        self.dead
    }
}
