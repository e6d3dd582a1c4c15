//! Module instances for ifwire.
//!
//! A module instance is a supervised resource that reports to its owner
//! through [`ModuleEvent`]s: `Up`, `Down`, and finally `Dead`. Two kinds
//! exist:
//!
//! - **command jobs** run an acquire command and, on request, a release
//!   command ([`CommandJob`]);
//! - **line-event modules** keep one process running and derive up/down from
//!   marker lines on its stdout ([`LineEventModule`]).
//!
//! Instances are created by name through a [`Registry`] and driven from a
//! single-threaded tokio runtime.
//!
//! # Example
//!
//! ```no_run
//! use ifwire_core::{ModuleEvent, Registry, Value};
//!
//! # async fn demo() {
//! let registry = Registry::builtin();
//! let mut instance = registry.instantiate(
//!     "run",
//!     &[Value::list(["/bin/true"]), Value::list(["/bin/true"])],
//! );
//!
//! assert_eq!(instance.next_event().await, Some(ModuleEvent::Up));
//! instance.die();
//! assert_eq!(instance.next_event().await, Some(ModuleEvent::Dead { error: false }));
//! # }
//! ```

pub mod command;
mod config;
mod error;
mod event;
mod instance;
pub mod line_event;
mod registry;
mod value;

// Re-export public API
pub use command::{Cmdline, CommandBuilder, CommandJob, JobState};
pub use config::{CommandConfig, LineEventConfig};
pub use error::ModuleError;
pub use event::ModuleEvent;
pub use instance::{Failed, Instance};
pub use line_event::LineEventModule;
pub use registry::{Constructor, Registry};
pub use value::{Args, Value};
