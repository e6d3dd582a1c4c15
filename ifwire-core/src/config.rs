//! Module configuration.

use std::path::PathBuf;

/// Settings for the line-event modules.
#[derive(Clone, Debug)]
pub struct LineEventConfig {
    /// Line prefix that marks the link as up.
    pub connected_marker: String,
    /// Line prefix that marks the link as down.
    pub disconnected_marker: String,
    /// Longest line accepted, delimiter excluded. Longer lines are dropped.
    pub max_line: usize,
    /// Bytes read from the pipe per read call.
    pub read_chunk: usize,
    pub delimiter: u8,
}

impl Default for LineEventConfig {
    fn default() -> Self {
        Self {
            connected_marker: "CTRL-EVENT-CONNECTED".to_string(),
            disconnected_marker: "CTRL-EVENT-DISCONNECTED".to_string(),
            max_line: 512,
            read_chunk: 512,
            delimiter: b'\n',
        }
    }
}

/// Settings for the built-in command jobs.
#[derive(Clone, Debug)]
pub struct CommandConfig {
    /// Path of the iproute2 `ip` binary.
    pub ip_path: PathBuf,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            ip_path: PathBuf::from("/sbin/ip"),
        }
    }
}
