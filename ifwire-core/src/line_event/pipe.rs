//! Pipe read side as a receive-channel producer.

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::rc::Rc;

use bytes::BytesMut;
use ifwire_flow::RecvSender;
use tokio::io::unix::AsyncFd;

/// Fills buffers lent over a receive channel from a non-blocking pipe.
///
/// One read per lent buffer; each successful read is acknowledged at once.
pub(crate) struct PipeSource {
    fd: AsyncFd<File>,
    output: RecvSender,
    request: Rc<RefCell<Option<BytesMut>>>,
}

impl PipeSource {
    pub(crate) fn new(fd: OwnedFd, output: RecvSender) -> io::Result<Self> {
        set_nonblocking(fd.as_raw_fd())?;
        let fd = AsyncFd::new(File::from(fd))?;

        let request: Rc<RefCell<Option<BytesMut>>> = Rc::default();
        let slot = Rc::clone(&request);
        output.on_request(move |buf| *slot.borrow_mut() = Some(buf));

        Ok(Self {
            fd,
            output,
            request,
        })
    }

    /// Whether a buffer is waiting to be filled.
    pub(crate) fn has_request(&self) -> bool {
        self.request.borrow().is_some()
    }

    /// Wait until the pipe is readable and fill the lent buffer.
    ///
    /// Returns the number of bytes read; `0` is end of stream. Pends forever
    /// while no buffer is lent. Cancel safe.
    pub(crate) async fn read(&self) -> io::Result<usize> {
        if !self.has_request() {
            return std::future::pending().await;
        }

        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| self.fill(inner.get_ref())) {
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Read whatever is available right now, without waiting.
    ///
    /// `Ok(None)` means nothing was available.
    pub(crate) fn try_read(&self) -> io::Result<Option<usize>> {
        loop {
            match self.fill(self.fd.get_ref()) {
                Ok(n) => return Ok(Some(n)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Bytes sitting in the pipe right now.
    pub(crate) fn available(&self) -> io::Result<usize> {
        let mut n: libc::c_int = 0;
        if unsafe { libc::ioctl(self.fd.as_raw_fd(), libc::FIONREAD, &mut n) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(usize::try_from(n).unwrap_or(0))
    }

    fn fill(&self, mut file: &File) -> io::Result<usize> {
        let mut slot = self.request.borrow_mut();
        let Some(buf) = slot.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "no buffer lent"));
        };

        buf.resize(self.output.mtu(), 0);
        let n = match file.read(&mut buf[..]) {
            Ok(n) => n,
            Err(e) => {
                buf.clear();
                return Err(e);
            }
        };
        buf.truncate(n);

        if n > 0 {
            if let Some(buf) = slot.take() {
                self.output.acknowledge(buf);
            }
        }
        Ok(n)
    }
}

/// Set O_NONBLOCK, as AsyncFd requires.
fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
