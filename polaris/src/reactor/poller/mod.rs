//! Readiness multiplexer over the platform notification facility.
//!
//! The scheduler's worker uses the poller to:
//! - block until the connection descriptor is ready, without a timeout,
//! - switch the descriptor between read-only and read-write interest,
//! - be woken by the controller thread on stop or flush requests.
//!
//! Only Linux `epoll` is supported.

pub(crate) mod common;

pub use common::Interest;
pub(crate) use common::{Readiness, Waker};

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub(crate) type Multiplexer = epoll::EpollMultiplexer;

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;
