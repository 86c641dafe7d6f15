use crate::connection::Connection;
use crate::reactor::Scheduler;

use std::sync::Arc;

/// Readiness events reported per wait unless configured otherwise.
const DEFAULT_MAX_EVENTS: usize = 16;

const DEFAULT_THREAD_NAME: &str = "polaris-display-poll";

/// Settings a [`Scheduler`] is built with.
#[derive(Debug, Clone)]
pub(crate) struct SchedulerConfig {
    pub(crate) max_events: usize,
    pub(crate) thread_name: String,
    pub(crate) join_on_stop: bool,
}

/// Builder for configuring and creating a scheduler.
///
/// # Examples
///
/// ```rust,ignore
/// let scheduler = SchedulerBuilder::new()
///     .max_events(32)
///     .thread_name("display-io")
///     .build(connection);
/// ```
#[derive(Debug, Clone)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
}

impl SchedulerBuilder {
    /// Creates a `SchedulerBuilder` with default configuration.
    ///
    /// Defaults: 16 events per wait, a worker thread named
    /// `polaris-display-poll`, and a joining [`Scheduler::stop`].
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig {
                max_events: DEFAULT_MAX_EVENTS,
                thread_name: DEFAULT_THREAD_NAME.to_owned(),
                join_on_stop: true,
            },
        }
    }

    /// Sets how many readiness events a single wait may report.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn max_events(mut self, n: usize) -> Self {
        assert!(n > 0, "max_events must be > 0");

        self.config.max_events = n;
        self
    }

    /// Sets the name of the worker thread.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Chooses whether [`Scheduler::stop`] joins the worker.
    ///
    /// When disabled, `stop()` returns without waiting; the worker still
    /// makes no sink call after it observes the stop, and releases its
    /// multiplexer on exit.
    pub fn join_on_stop(mut self, join: bool) -> Self {
        self.config.join_on_stop = join;
        self
    }

    /// Builds a stopped scheduler for `connection`.
    pub fn build<C: Connection>(self, connection: Arc<C>) -> Scheduler<C> {
        Scheduler::new(connection, self.config)
    }
}

impl Default for SchedulerBuilder {
    /// Creates a default `SchedulerBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
