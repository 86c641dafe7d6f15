use super::platform::{sys_eventfd, sys_read, sys_write};

use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

/// Readiness conditions a descriptor is registered for.
///
/// Error and hang-up conditions are always reported, whatever the interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    ReadWrite,
}

impl Interest {
    pub fn is_writable(self) -> bool {
        matches!(self, Interest::ReadWrite)
    }
}

/// Readiness reported by the multiplexer for one registered descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Readiness {
    /// Token the descriptor was registered with.
    pub(crate) token: u64,

    pub(crate) readable: bool,
    pub(crate) writable: bool,

    /// An error condition is pending on the descriptor.
    pub(crate) error: bool,

    /// The peer closed the connection.
    pub(crate) hangup: bool,
}

/// Wakes a thread blocked in [`Multiplexer::wait`](super::Multiplexer::wait).
///
/// Backed by a non-blocking `eventfd`. Wakes coalesce: several calls before
/// the worker drains the counter produce a single wake-up.
#[derive(Debug)]
pub(crate) struct Waker(OwnedFd);

impl Waker {
    pub(crate) fn new() -> io::Result<Self> {
        sys_eventfd().map(Waker)
    }

    pub(crate) fn wake(&self) {
        let buf = 1u64.to_ne_bytes();

        // EAGAIN means the counter is saturated, which already guarantees a wake-up.
        let _ = sys_write(self.0.as_raw_fd(), &buf);
    }

    /// Resets the counter so the next wait blocks again.
    pub(crate) fn drain(&self) {
        let mut buf = [0u8; 8];
        let _ = sys_read(self.0.as_raw_fd(), &mut buf);
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}
