//! Error types shared by the scheduler, the multiplexer and the transports.
//!
//! Errors fall into three groups:
//! - **environment** errors, reported synchronously by
//!   [`Scheduler::start`](crate::Scheduler::start) and never retried,
//! - **transport** errors, which end the worker loop and invalidate the
//!   connection,
//! - **lifecycle** errors, returned when the scheduler is driven in the
//!   wrong state.
//!
//! A flush that would block is not an error; it is reported as
//! [`FlushOutcome::WouldBlock`](crate::FlushOutcome::WouldBlock).

use std::io;
use std::os::fd::RawFd;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by `polaris`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The readiness multiplexer could not be created.
    #[error("failed to create readiness multiplexer: {0}")]
    Multiplexer(#[source] io::Error),

    /// The connection descriptor could not be registered with the multiplexer.
    #[error("failed to register descriptor {fd} with the multiplexer: {source}")]
    Register {
        fd: RawFd,
        #[source]
        source: io::Error,
    },

    /// The wake-up eventfd could not be created or registered.
    #[error("failed to set up the worker waker: {0}")]
    Waker(#[source] io::Error),

    /// The worker thread could not be spawned.
    #[error("failed to spawn the protocol worker thread: {0}")]
    Spawn(#[source] io::Error),

    /// `start()` was called while a worker is still running.
    #[error("the scheduler is already processing events")]
    AlreadyActive,

    /// The connection handle has been invalidated by a previous failure.
    #[error("the display connection is no longer valid")]
    InvalidConnection,

    /// The peer hung up.
    #[error("the display connection hung up")]
    HangUp,

    /// The multiplexer reported an error condition on the descriptor.
    #[error("error condition reported on the display connection")]
    DescriptorError,

    /// Waiting on the multiplexer failed for a reason other than a signal.
    #[error("waiting for readiness failed: {0}")]
    Poll(#[source] io::Error),

    /// An inbound message could not be decoded.
    #[error("failed to decode a protocol message: {0}")]
    Decode(#[from] DecodeError),

    /// A read or write on the transport failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns `true` for failures of the hosting environment.
    ///
    /// These only occur while starting a scheduler.
    pub fn is_environment(&self) -> bool {
        matches!(
            self,
            Error::Multiplexer(_) | Error::Register { .. } | Error::Waker(_) | Error::Spawn(_)
        )
    }

    /// Returns `true` for failures that make the connection unusable.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::HangUp | Error::DescriptorError | Error::Poll(_) | Error::Decode(_) | Error::Io(_)
        )
    }
}

/// Failures of the wire codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown opcode {0:#06x}")]
    UnknownOpcode(u16),

    #[error("payload of opcode {opcode:#06x} has {actual} bytes, expected {expected}")]
    BadLength {
        opcode: u16,
        expected: usize,
        actual: usize,
    },

    #[error("frame payload of {0} bytes exceeds the maximum")]
    Oversized(usize),

    #[error("window title is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown key state {0}")]
    UnknownKeyState(u8),

    #[error("unknown window state {0}")]
    UnknownWindowState(u8),
}
