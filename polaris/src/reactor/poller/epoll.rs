//! Linux `epoll`-based multiplexer.
//!
//! Responsibilities:
//! - Own exactly one `epoll` instance, created close-on-exec
//! - Register the connection descriptor and change its interest in place
//! - Block without a timeout until the descriptor is ready or the waker fires
//!
//! The `epoll` descriptor is an [`OwnedFd`], so every exit path of the
//! worker (normal stop, transport failure, panic) closes it exactly once.
//! Registered descriptors are not owned and are never closed here.

use super::common::{Interest, Readiness, Waker};
use super::platform::sys_epoll_create_cloexec;

use libc::{
    EPOLL_CTL_ADD, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT, epoll_ctl, epoll_event,
    epoll_wait,
};
use log::debug;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;

/// Reserved token used internally for the wake-up event.
///
/// Connection tokens are small integers, so `u64::MAX` never collides.
const WAKE_TOKEN: u64 = u64::MAX;

/// Linux `epoll` multiplexer.
///
/// This multiplexer owns:
/// - an `epoll` instance,
/// - a reusable event buffer,
/// - a shared handle to the waker registered with it, if any.
pub(crate) struct EpollMultiplexer {
    /// Epoll file descriptor.
    epoll: OwnedFd,

    /// Reusable buffer for epoll events.
    events: Vec<epoll_event>,

    /// Waker registered as a persistent wake source.
    waker: Option<Arc<Waker>>,
}

impl EpollMultiplexer {
    /// Creates a multiplexer whose waits report at most `capacity` events.
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let epoll = sys_epoll_create_cloexec()?;
        debug!("created epoll instance {}", epoll.as_raw_fd());

        Ok(Self {
            epoll,
            events: Vec::with_capacity(capacity.max(1)),
            waker: None,
        })
    }

    /// Registers `waker` so that [`Waker::wake`] interrupts [`wait`](Self::wait).
    pub(crate) fn register_waker(&mut self, waker: Arc<Waker>) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, waker.fd(), WAKE_TOKEN, EPOLLIN as u32)?;
        self.waker = Some(waker);
        Ok(())
    }

    /// Registers a descriptor with the given interest.
    pub(crate) fn register(&self, fd: RawFd, token: u64, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, token, interest_flags(interest))
    }

    /// Changes the interest of an already registered descriptor.
    ///
    /// Uses `EPOLL_CTL_MOD` so that no readiness is lost between a removal
    /// and a re-registration.
    pub(crate) fn modify(&self, fd: RawFd, token: u64, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_MOD, fd, token, interest_flags(interest))
    }

    /// Blocks until at least one registered descriptor is ready.
    ///
    /// Readiness of connection descriptors is written to `ready`, which is
    /// cleared first. A wake-up from the waker is drained and not reported,
    /// so `ready` may come back empty. A signal interrupting the wait is
    /// also reported as an empty, successful wait.
    pub(crate) fn wait(&mut self, ready: &mut Vec<Readiness>) -> io::Result<()> {
        ready.clear();

        let n = unsafe {
            epoll_wait(
                self.epoll.as_raw_fd(),
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                -1,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        unsafe {
            self.events.set_len(n as usize);
        }

        for ev in &self.events {
            let token = ev.u64;
            let flags = ev.events;

            if token == WAKE_TOKEN {
                if let Some(waker) = &self.waker {
                    waker.drain();
                }
                continue;
            }

            ready.push(Readiness {
                token,
                readable: flags & EPOLLIN as u32 != 0,
                writable: flags & EPOLLOUT as u32 != 0,
                error: flags & EPOLLERR as u32 != 0,
                hangup: flags & EPOLLHUP as u32 != 0,
            });
        }

        unsafe {
            self.events.set_len(0);
        }

        Ok(())
    }

    fn ctl(&self, op: i32, fd: RawFd, token: u64, flags: u32) -> io::Result<()> {
        let mut event = epoll_event {
            events: flags,
            u64: token,
        };

        let rc = unsafe { epoll_ctl(self.epoll.as_raw_fd(), op, fd, &mut event) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

/// Level-triggered flags for an interest; error and hang-up are always on.
fn interest_flags(interest: Interest) -> u32 {
    let mut flags = EPOLLIN | EPOLLERR | EPOLLHUP;

    if interest.is_writable() {
        flags |= EPOLLOUT;
    }

    flags as u32
}
