use super::poller::{Interest, Multiplexer, Readiness};
use super::stats::Counters;
use crate::connection::{Connection, FlushOutcome};
use crate::error::{Error, Result};
use crate::event::EventSink;

use log::{debug, error, trace};
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Token the connection descriptor is registered with.
pub(crate) const CONNECTION_TOKEN: u64 = 0;

/// The protocol I/O worker.
///
/// A `Worker` owns everything the loop touches: the multiplexer, the event
/// sink and the readiness buffer. Nothing here is shared with the controller
/// except the active flag and the counters.
///
/// Each iteration:
/// 1. Deliver messages already buffered by the connection
/// 2. Exit if stopped
/// 3. Flush outbound messages, widening interest if the transport is full
/// 4. Block on the multiplexer
/// 5. Exit if stopped while blocked
/// 6. Handle readiness: hang-up and errors end the loop, reads dispatch,
///    writes flush and narrow interest once everything went out
pub(crate) struct Worker<C> {
    connection: Arc<C>,
    descriptor: RawFd,

    multiplexer: Multiplexer,
    ready: Vec<Readiness>,

    /// Interest the descriptor is currently registered with.
    interest: Interest,

    sink: Box<dyn EventSink>,

    /// Cleared by the controller to stop the loop.
    active: Arc<AtomicBool>,

    counters: Arc<Counters>,
}

impl<C: Connection> Worker<C> {
    /// Creates a worker for a descriptor already registered with `interest`.
    pub(crate) fn new(
        connection: Arc<C>,
        multiplexer: Multiplexer,
        interest: Interest,
        sink: Box<dyn EventSink>,
        active: Arc<AtomicBool>,
        counters: Arc<Counters>,
    ) -> Self {
        let descriptor = connection.descriptor();
        counters.record_interest(interest);

        Self {
            connection,
            descriptor,
            multiplexer,
            ready: Vec::new(),
            interest,
            sink,
            active,
            counters,
        }
    }

    /// Runs the loop until it is stopped or the connection fails.
    ///
    /// A failure invalidates the connection. In every case the active flag
    /// is cleared and the multiplexer and sink are dropped on return.
    pub(crate) fn run(mut self) {
        let outcome = self.run_loop();

        self.active.store(false, Ordering::Release);

        match outcome {
            Ok(()) => debug!("display worker for fd {} stopped", self.descriptor),
            Err(err) => {
                error!("display connection fd {} failed: {}", self.descriptor, err);
                self.connection.invalidate(&err);
            }
        }
    }

    fn run_loop(&mut self) -> Result<()> {
        loop {
            let delivered = self.connection.dispatch_pending(&mut *self.sink)?;
            self.counters.record_pending(delivered);

            if !self.is_active() {
                return Ok(());
            }

            if self.flush()? == FlushOutcome::WouldBlock {
                self.set_interest(Interest::ReadWrite)?;
            }

            self.multiplexer
                .wait(&mut self.ready)
                .map_err(Error::Poll)?;

            if !self.is_active() {
                return Ok(());
            }

            let ready = std::mem::take(&mut self.ready);
            let result = self.handle_ready(&ready);
            self.ready = ready;
            result?;
        }
    }

    fn handle_ready(&mut self, ready: &[Readiness]) -> Result<()> {
        for readiness in ready {
            if readiness.token != CONNECTION_TOKEN {
                continue;
            }

            if readiness.error {
                return Err(Error::DescriptorError);
            }
            if readiness.hangup {
                return Err(Error::HangUp);
            }

            if readiness.readable {
                let delivered = self.connection.dispatch(&mut *self.sink)?;
                self.counters.record_dispatch(delivered);
                trace!("dispatched {} events", delivered);
            }

            if readiness.writable && self.flush()? == FlushOutcome::Complete {
                self.set_interest(Interest::Read)?;
            }
        }

        Ok(())
    }

    fn flush(&self) -> Result<FlushOutcome> {
        self.counters.record_flush();
        self.connection.flush()
    }

    /// Re-registers the descriptor if `interest` differs from the current one.
    fn set_interest(&mut self, interest: Interest) -> Result<()> {
        if self.interest == interest {
            return Ok(());
        }

        self.multiplexer
            .modify(self.descriptor, CONNECTION_TOKEN, interest)
            .map_err(Error::Poll)?;
        self.interest = interest;

        match interest {
            Interest::ReadWrite => {
                trace!("fd {} would block, widening interest", self.descriptor);
                self.counters.record_widen();
            }
            Interest::Read => {
                trace!("fd {} flushed, narrowing interest", self.descriptor);
                self.counters.record_narrow();
            }
        }

        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}
