use super::poller::{Interest, Multiplexer, Waker};
use super::stats::{Counters, SchedulerStats};
use super::worker::{CONNECTION_TOKEN, Worker};
use crate::builder::SchedulerConfig;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::event::EventSink;

use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// Drives a [`Connection`] from a dedicated background thread.
///
/// The scheduler multiplexes the connection's descriptor with `epoll` and
/// alternates between dispatching inbound messages to an [`EventSink`] and
/// flushing outbound ones. When the transport is full, it waits for write
/// readiness instead of retrying.
///
/// # Lifecycle
///
/// - [`start`](Self::start) creates a fresh multiplexer, registers the
///   descriptor for read and write readiness and spawns the worker.
/// - [`stop`](Self::stop) clears the active flag and wakes the worker. By
///   default it then joins the worker, so the sink has been dropped and the
///   multiplexer closed by the time it returns.
/// - A stopped scheduler can be started again once its worker has exited;
///   each run gets its own multiplexer and active flag.
///
/// Stopping is cooperative. A worker blocked inside a connection's dispatch
/// or flush call is not interrupted, and a joining `stop()` waits for it.
///
/// Dropping the scheduler stops it.
///
/// # Examples
///
/// ```rust,ignore
/// let (tx, rx) = std::sync::mpsc::channel();
/// let mut scheduler = SchedulerBuilder::new().build(connection);
///
/// scheduler.start(ChannelSink::new(tx))?;
/// let event = rx.recv()?;
/// scheduler.stop();
/// ```
pub struct Scheduler<C: Connection> {
    connection: Arc<C>,
    config: SchedulerConfig,

    /// Active flag of the current run.
    active: Arc<AtomicBool>,

    /// Waker registered with the current run's multiplexer.
    waker: Option<Arc<Waker>>,

    worker: Option<JoinHandle<()>>,

    counters: Arc<Counters>,
}

impl<C: Connection> Scheduler<C> {
    pub(crate) fn new(connection: Arc<C>, config: SchedulerConfig) -> Self {
        Self {
            connection,
            config,
            active: Arc::new(AtomicBool::new(false)),
            waker: None,
            worker: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Starts processing events on a background thread.
    ///
    /// Returns once the worker is spawned; the first dispatch may happen at
    /// any point afterwards. `sink` is moved to the worker and dropped when
    /// the worker exits.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyActive`] if a worker is still running, including a
    ///   worker detached by [`stop`](Self::stop) that has not exited yet. No
    ///   second worker is ever spawned for the same scheduler.
    /// - [`Error::InvalidConnection`] if the connection failed earlier.
    /// - An environment error if the multiplexer, the waker, the descriptor
    ///   registration or the thread could not be set up. Nothing is retried.
    pub fn start<S>(&mut self, sink: S) -> Result<()>
    where
        S: EventSink + 'static,
    {
        if self.is_running() {
            return Err(Error::AlreadyActive);
        }
        self.reap();

        if !self.connection.is_valid() {
            return Err(Error::InvalidConnection);
        }

        let fd = self.connection.descriptor();
        let waker = Arc::new(Waker::new().map_err(Error::Waker)?);

        let mut multiplexer = Multiplexer::new(self.config.max_events).map_err(Error::Multiplexer)?;
        multiplexer
            .register_waker(waker.clone())
            .map_err(Error::Waker)?;
        multiplexer
            .register(fd, CONNECTION_TOKEN, Interest::ReadWrite)
            .map_err(|source| Error::Register { fd, source })?;

        let active = Arc::new(AtomicBool::new(true));
        let worker = Worker::new(
            self.connection.clone(),
            multiplexer,
            Interest::ReadWrite,
            Box::new(sink),
            active.clone(),
            self.counters.clone(),
        );

        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || worker.run())
            .map_err(Error::Spawn)?;

        debug!("started display worker for fd {}", fd);

        self.active = active;
        self.waker = Some(waker);
        self.worker = Some(handle);

        Ok(())
    }

    /// Stops processing events.
    ///
    /// Idempotent and callable from any thread that owns the scheduler.
    /// With [`join_on_stop`](crate::SchedulerBuilder::join_on_stop) enabled
    /// (the default), no sink call happens after this returns. Otherwise
    /// `stop()` returns without waiting; the worker makes no further sink
    /// call once it has observed the cleared flag, which it checks after
    /// every wake-up. Until it exits, [`is_running`](Self::is_running) stays
    /// `true` and `start()` is rejected.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Release);

        if let Some(waker) = self.waker.take() {
            waker.wake();
        }

        if !self.config.join_on_stop {
            if self.worker.is_some() {
                debug!("display worker left to exit on its own");
            }
            return;
        }

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("display worker panicked");
            }
            debug!("display worker joined");
        }
    }

    /// Wakes the worker so that it flushes outbound messages.
    ///
    /// Call this after queueing messages on the connection while the worker
    /// may be waiting for inbound data only. Does nothing when stopped.
    pub fn request_flush(&self) {
        if let Some(waker) = &self.waker {
            if self.is_running() {
                waker.wake();
            }
        }
    }

    /// Returns `true` while a worker thread is alive.
    ///
    /// Turns `false` once the worker has exited, whether it was stopped or
    /// the connection failed.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stats(&self) -> SchedulerStats {
        self.counters.snapshot()
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    /// Collects a worker that exited on its own.
    fn reap(&mut self) {
        self.waker = None;

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("display worker panicked");
            }
        }
    }
}

impl<C: Connection> Drop for Scheduler<C> {
    fn drop(&mut self) {
        self.stop();
    }
}
