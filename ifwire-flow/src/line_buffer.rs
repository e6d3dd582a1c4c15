//! Splits a byte stream into delimited lines.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use bytes::BytesMut;

use crate::channel::{pass_channel, PassReceiver, PassSender, RecvReceiver};
use crate::error::FlowError;
use crate::pending::PendingQueue;

/// Reads chunks from a receive channel and offers one line at a time on a
/// pass channel, delimiter stripped.
///
/// A line longer than the maximum is dropped together with everything up
/// to its delimiter. No more input is requested while a complete line is
/// still buffered, so a fast producer cannot grow the buffer without bound.
pub struct LineBuffer {
    inner: Rc<Inner>,
}

struct Inner {
    input: RecvReceiver,
    output: PassSender,
    max_line: usize,
    delimiter: u8,
    state: RefCell<State>,
}

struct State {
    pending: BytesMut,
    /// Our input buffer, when not lent to the producer.
    chunk: Option<BytesMut>,
    /// Dropping the tail of an overlong line.
    discarding: bool,
    /// A line has been offered and not yet acknowledged.
    line_out: bool,
}

impl LineBuffer {
    /// Build a line buffer over `input`, returning it together with the
    /// consumer end of its line channel, whose MTU is `max_line`.
    pub fn new(
        input: RecvReceiver,
        max_line: usize,
        delimiter: u8,
        queue: &PendingQueue,
    ) -> Result<(Self, PassReceiver), FlowError> {
        if max_line == 0 {
            return Err(FlowError::ZeroSize { what: "maximum line length" });
        }
        if input.mtu() == 0 {
            return Err(FlowError::ZeroSize { what: "input MTU" });
        }

        let (output, lines) = pass_channel(max_line, queue);
        let inner = Rc::new(Inner {
            state: RefCell::new(State {
                pending: BytesMut::with_capacity(max_line + input.mtu()),
                chunk: Some(BytesMut::with_capacity(input.mtu())),
                discarding: false,
                line_out: false,
            }),
            input,
            output,
            max_line,
            delimiter,
        });

        let weak = Rc::downgrade(&inner);
        inner.input.on_acknowledge(move |chunk| {
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.handle_input(chunk);
            }
        });

        let weak = Rc::downgrade(&inner);
        inner.output.on_acknowledge(move |_line| {
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.state.borrow_mut().line_out = false;
                inner.pump();
            }
        });

        inner.pump();
        Ok((Self { inner }, lines))
    }

    /// Maximum line length, excluding the delimiter.
    pub fn max_line(&self) -> usize {
        self.inner.max_line
    }

    /// Bytes received but not yet emitted as a line.
    pub fn buffered(&self) -> usize {
        self.inner.state.borrow().pending.len()
    }
}

impl Inner {
    fn handle_input(&self, mut chunk: BytesMut) {
        {
            let mut state = self.state.borrow_mut();
            state.pending.extend_from_slice(&chunk);
            chunk.clear();
            state.chunk = Some(chunk);
        }
        self.pump();
    }

    /// Offer the next complete line, or ask for more input if there is none.
    fn pump(&self) {
        let mut state = self.state.borrow_mut();
        if state.line_out {
            return;
        }

        while let Some(pos) = state.pending.iter().position(|&b| b == self.delimiter) {
            let mut line = state.pending.split_to(pos + 1);
            line.truncate(pos);

            if state.discarding {
                state.discarding = false;
                continue;
            }
            if line.len() > self.max_line {
                tracing::warn!(len = line.len(), max = self.max_line, "dropping overlong line");
                continue;
            }

            state.line_out = true;
            self.output.offer(line);
            return;
        }

        // No delimiter in what is left
        if state.discarding {
            state.pending.clear();
        } else if state.pending.len() > self.max_line {
            tracing::warn!(max = self.max_line, "dropping overlong line");
            state.pending.clear();
            state.discarding = true;
        }

        if let Some(chunk) = state.chunk.take() {
            self.input.request_receive(chunk);
        }
    }
}
