//! Background protocol I/O scheduling.
//!
//! This module implements the reactor that keeps a display connection
//! moving. It is responsible for:
//! - waiting for readiness on the connection descriptor,
//! - dispatching inbound messages to the event sink in transport order,
//! - flushing outbound messages and handling partial-write backpressure,
//! - starting and stopping the background worker.
//!
//! The worker runs on its own thread and shares only an atomic active flag
//! and a set of counters with the controller.

mod core;
mod stats;
mod worker;

pub(crate) mod poller;

pub use self::core::Scheduler;
pub use poller::Interest;
pub use stats::SchedulerStats;
