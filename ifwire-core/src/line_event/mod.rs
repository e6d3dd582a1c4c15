//! Supervised processes whose output lines raise up/down events.
//!
//! The child's stdout is a pipe. Its read side feeds a [`LineBuffer`]
//! through a receive channel, and every complete line is matched against
//! the connected/disconnected markers. The process exiting ends the
//! instance; losing the pipe does not.

mod markers;
mod pipe;

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::rc::{Rc, Weak};

use ifwire_flow::{recv_channel, LineBuffer, PassReceiver, PendingQueue};
use ifwire_proc::{ExitStatus, ProcError, Process, SpawnSpec};

use crate::command::Cmdline;
use crate::config::LineEventConfig;
use crate::error::ModuleError;
use crate::event::{Mailbox, ModuleEvent};
use crate::value::{Args, Value};

pub use markers::LinkTracker;
use pipe::PipeSource;

/// Module type name of the wpa_supplicant backend.
pub const WPA_SUPPLICANT: &str = "net.backend.wpa_supplicant";

/// Build the wpa_supplicant command line from
/// `(string ifname, string conf, string exec, list(string) args)`.
///
/// The extra arguments come first, then `-i IFNAME -c CONF`.
pub fn wpa_supplicant_cmdline(values: &[Value]) -> Result<Cmdline, ModuleError> {
    let mut args = Args::new(WPA_SUPPLICANT, values, 4)?;
    let ifname = args.string("ifname")?;
    let conf = args.string("conf")?;
    let exec = args.string("exec")?;
    let extra = args.string_list("args")?;

    if exec.is_empty() {
        return Err(ModuleError::config(WPA_SUPPLICANT, "empty executable path"));
    }

    let mut cmdline = Vec::with_capacity(extra.len() + 5);
    cmdline.push(exec.to_string());
    cmdline.extend(extra.iter().map(|s| s.to_string()));
    cmdline.extend(["-i", ifname, "-c", conf].map(str::to_string));
    Ok(cmdline)
}

/// A running line-event module instance.
pub struct LineEventModule {
    module: &'static str,
    queue: PendingQueue,
    process: Process,
    pipe: Option<PipeSource>,
    _lines: LineBuffer,
    shared: Rc<Shared>,
    exit_status: Option<ExitStatus>,
    /// Bytes still to read after the exit.
    leftover: usize,
}

/// State reachable from the line handler.
struct Shared {
    module: &'static str,
    lines: PassReceiver,
    state: RefCell<State>,
}

struct State {
    tracker: LinkTracker,
    dying: bool,
    mailbox: Mailbox,
}

enum Wake {
    Read(io::Result<usize>),
    Exited(Result<ExitStatus, ProcError>),
}

impl LineEventModule {
    /// Spawn `cmdline` with its stdout on a pipe and start watching lines.
    ///
    /// Must be called from within a tokio runtime with I/O enabled.
    pub fn spawn(
        module: &'static str,
        cmdline: &[String],
        config: &LineEventConfig,
    ) -> Result<Self, ModuleError> {
        let spec = SpawnSpec::from_argv(cmdline).map_err(|e| ModuleError::spawn(module, e))?;
        let (read, write) = ifwire_proc::pipe().map_err(|e| ModuleError::spawn(module, e))?;

        // Everything that can fail is set up before the child exists
        let queue = PendingQueue::new();
        let (source_tx, source_rx) = recv_channel(config.read_chunk, &queue);
        let pipe = PipeSource::new(read, source_tx).map_err(|e| ModuleError::io(module, e))?;
        let (line_buffer, lines) =
            LineBuffer::new(source_rx, config.max_line, config.delimiter, &queue)
                .map_err(|e| ModuleError::config(module, e.to_string()))?;

        let process = Process::spawn(spec.redirect(write, libc::STDOUT_FILENO))
            .map_err(|e| ModuleError::spawn(module, e))?;

        tracing::info!(module, pid = process.pid().as_raw(), program = process.program(), "process started");

        let shared = Rc::new(Shared {
            module,
            lines,
            state: RefCell::new(State {
                tracker: LinkTracker::new(config),
                dying: false,
                mailbox: Mailbox::default(),
            }),
        });

        let weak = Rc::downgrade(&shared);
        shared.lines.on_offer(move |line| {
            if let Some(shared) = Weak::upgrade(&weak) {
                shared.handle_line(&line);
                shared.lines.acknowledge(line);
            }
        });

        Ok(Self {
            module,
            queue,
            process,
            pipe: Some(pipe),
            _lines: line_buffer,
            shared,
            exit_status: None,
            leftover: 0,
        })
    }

    /// `net.backend.wpa_supplicant(ifname, conf, exec, args)`.
    pub fn wpa_supplicant(values: &[Value], config: &LineEventConfig) -> Result<Self, ModuleError> {
        let cmdline = wpa_supplicant_cmdline(values)?;
        Self::spawn(WPA_SUPPLICANT, &cmdline, config)
    }

    pub fn module(&self) -> &'static str {
        self.module
    }

    pub fn process(&self) -> &Process {
        &self.process
    }

    pub fn is_up(&self) -> bool {
        self.shared.state.borrow().tracker.is_up()
    }

    /// Whether termination has been requested.
    pub fn is_dying(&self) -> bool {
        self.shared.state.borrow().dying
    }

    /// Whether the pipe is still being read.
    pub fn is_reading(&self) -> bool {
        self.pipe.is_some()
    }

    /// Ask the process to terminate. From here on lines are ignored and the
    /// exit counts as clean.
    pub fn die(&mut self) {
        {
            let mut state = self.shared.state.borrow_mut();
            if state.dying || state.mailbox.is_dead() {
                return;
            }
            state.dying = true;
        }

        tracing::info!(module = self.module, pid = self.process.pid().as_raw(), "terminating");
        if let Err(e) = self.process.request_terminate() {
            tracing::warn!(module = self.module, error = %e, "failed to signal process");
        }
    }

    /// Wait for the next owner notification.
    ///
    /// Returns `None` once `Dead` has been delivered. Cancel safe.
    pub async fn next_event(&mut self) -> Option<ModuleEvent> {
        loop {
            self.queue.drain();
            {
                let mut state = self.shared.state.borrow_mut();
                if let Some(event) = state.mailbox.take() {
                    return Some(event);
                }
                if state.mailbox.is_dead() {
                    return None;
                }
            }

            if let Some(status) = self.exit_status {
                // Output written before the exit is still in the pipe. Only
                // that much is read; a grandchild holding the pipe open
                // cannot delay Dead.
                if !self.read_after_exit() {
                    self.finish(status);
                }
                continue;
            }

            let wake = {
                let pipe = self.pipe.as_ref().filter(|p| p.has_request());
                tokio::select! {
                    read = read_pipe(pipe) => Wake::Read(read),
                    status = self.process.exited() => Wake::Exited(status),
                }
            };

            match wake {
                Wake::Read(Ok(0)) => {
                    tracing::info!(module = self.module, "pipe closed");
                    self.pipe = None;
                }
                Wake::Read(Ok(n)) => {
                    tracing::trace!(module = self.module, bytes = n, "read from pipe");
                }
                Wake::Read(Err(e)) => {
                    tracing::error!(module = self.module, error = %e, "pipe read failed");
                    self.pipe = None;
                }
                Wake::Exited(Ok(status)) => {
                    self.leftover = self.pending_output();
                    tracing::debug!(module = self.module, %status, leftover = self.leftover, "process exited");
                    self.exit_status = Some(status);
                }
                Wake::Exited(Err(e)) => {
                    tracing::error!(module = self.module, error = %e, "lost track of process");
                    self.pipe = None;
                    self.shared.post(ModuleEvent::Dead { error: true });
                }
            }
        }
    }

    fn pending_output(&self) -> usize {
        let Some(pipe) = self.pipe.as_ref() else {
            return 0;
        };
        pipe.available().unwrap_or_else(|e| {
            tracing::warn!(module = self.module, error = %e, "cannot size leftover output");
            0
        })
    }

    /// Read one more chunk of the output left at exit. Returns false once
    /// it is consumed and the pipe is closed.
    fn read_after_exit(&mut self) -> bool {
        if self.leftover == 0 {
            if self.pipe.take().is_some() {
                tracing::debug!(module = self.module, "leftover output consumed");
            }
            return false;
        }

        let Some(pipe) = self.pipe.as_ref() else {
            return false;
        };

        match pipe.try_read() {
            Ok(Some(0)) => tracing::info!(module = self.module, "pipe closed"),
            Ok(Some(n)) => {
                self.leftover = self.leftover.saturating_sub(n);
                return true;
            }
            Ok(None) => tracing::debug!(module = self.module, "pipe still held open after exit"),
            Err(e) => tracing::error!(module = self.module, error = %e, "pipe read failed"),
        }
        self.pipe = None;
        false
    }

    fn finish(&mut self, status: ExitStatus) {
        let error = !self.is_dying();
        if error {
            tracing::error!(module = self.module, %status, "process exited unexpectedly");
        } else {
            tracing::info!(module = self.module, %status, "process terminated");
        }
        self.shared.post(ModuleEvent::Dead { error });
    }
}

impl Shared {
    fn handle_line(&self, line: &[u8]) {
        let mut state = self.state.borrow_mut();
        if state.dying || state.mailbox.is_dead() {
            return;
        }

        if let Some(event) = state.tracker.on_line(line) {
            tracing::info!(module = self.module, %event, "link event");
            state.mailbox.post(event);
        }
    }

    fn post(&self, event: ModuleEvent) {
        self.state.borrow_mut().mailbox.post(event);
    }
}

async fn read_pipe(pipe: Option<&PipeSource>) -> io::Result<usize> {
    match pipe {
        Some(pipe) => pipe.read().await,
        None => std::future::pending().await,
    }
}

impl fmt::Debug for LineEventModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineEventModule")
            .field("module", &self.module)
            .field("process", &self.process)
            .field("reading", &self.pipe.is_some())
            .field("up", &self.is_up())
            .field("dying", &self.is_dying())
            .finish()
    }
}
