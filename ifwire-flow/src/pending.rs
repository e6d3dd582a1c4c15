//! Deferred dispatch queue.
//!
//! Notifications between pipeline stages are never invoked inline. They are
//! posted here and run when the event loop drains the queue, so a handler
//! can call back into the object that notified it, or drop it, without
//! reentering its own call frame.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

type Job = Box<dyn FnOnce()>;

/// FIFO of callbacks waiting for the next drain.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct PendingQueue {
    jobs: Rc<RefCell<VecDeque<Job>>>,
}

impl PendingQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `job` to run on the next drain.
    pub fn post(&self, job: impl FnOnce() + 'static) {
        self.jobs.borrow_mut().push_back(Box::new(job));
    }

    /// Number of jobs waiting.
    pub fn len(&self) -> usize {
        self.jobs.borrow().len()
    }

    /// Whether no job is waiting.
    pub fn is_empty(&self) -> bool {
        self.jobs.borrow().is_empty()
    }

    /// Run jobs in order until the queue is empty, including jobs posted by
    /// jobs. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            // The borrow ends before the job runs, so jobs may post
            let job = self.jobs.borrow_mut().pop_front();
            match job {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl fmt::Debug for PendingQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingQueue")
            .field("pending", &self.len())
            .finish()
    }
}
