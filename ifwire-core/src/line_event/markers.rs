//! Up/down tracking from marker lines.

use crate::config::LineEventConfig;
use crate::event::ModuleEvent;

/// Turns marker lines into edge-triggered up/down transitions.
///
/// A marker only counts at the start of a line. Repeating the marker for
/// the current state is ignored.
#[derive(Debug, Clone)]
pub struct LinkTracker {
    connected: Vec<u8>,
    disconnected: Vec<u8>,
    up: bool,
}

impl LinkTracker {
    pub fn new(config: &LineEventConfig) -> Self {
        Self {
            connected: config.connected_marker.as_bytes().to_vec(),
            disconnected: config.disconnected_marker.as_bytes().to_vec(),
            up: false,
        }
    }

    pub fn is_up(&self) -> bool {
        self.up
    }

    /// Feed one line, delimiter stripped.
    pub fn on_line(&mut self, line: &[u8]) -> Option<ModuleEvent> {
        if line.starts_with(&self.connected) {
            tracing::debug!("connected marker");
            if !self.up {
                self.up = true;
                return Some(ModuleEvent::Up);
            }
        } else if line.starts_with(&self.disconnected) {
            tracing::debug!("disconnected marker");
            if self.up {
                self.up = false;
                return Some(ModuleEvent::Down);
            }
        }
        None
    }
}
