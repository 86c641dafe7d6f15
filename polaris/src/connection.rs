//! The boundary between the scheduler and the native display connection.

use crate::error::{Error, Result};
use crate::event::EventSink;

use std::os::fd::RawFd;

/// Result of a successful flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Every queued outbound message reached the transport.
    Complete,

    /// The transport buffer is full; the rest stays queued.
    WouldBlock,
}

/// An open duplex connection to the display service.
///
/// The connection is created by its owner before any scheduler exists and
/// outlives it. While a scheduler is running, its worker is the only caller
/// of the dispatch and flush methods; the owner may still queue outbound
/// messages and query [`is_valid`](Self::is_valid).
///
/// None of these calls may block indefinitely. A worker stuck inside one of
/// them cannot be interrupted by [`Scheduler::stop`](crate::Scheduler::stop).
pub trait Connection: Send + Sync + 'static {
    /// Descriptor the multiplexer waits on. The scheduler never closes it.
    fn descriptor(&self) -> RawFd;

    /// Delivers messages that are already buffered locally, without any I/O.
    ///
    /// Returns the number of events delivered.
    fn dispatch_pending(&self, sink: &mut dyn EventSink) -> Result<usize>;

    /// Reads what the transport has to offer and delivers the decoded events.
    ///
    /// Called after the descriptor was reported readable.
    fn dispatch(&self, sink: &mut dyn EventSink) -> Result<usize>;

    /// Writes queued outbound messages.
    fn flush(&self) -> Result<FlushOutcome>;

    /// Marks the connection unusable after a terminal transport failure.
    fn invalidate(&self, reason: &Error);

    fn is_valid(&self) -> bool;
}
