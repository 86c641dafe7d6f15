use super::poller::Interest;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Counters updated by the worker, readable from any thread.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    widened: AtomicU64,
    narrowed: AtomicU64,
    dispatch_rounds: AtomicU64,
    events_delivered: AtomicU64,
    flush_attempts: AtomicU64,
    write_interest: AtomicBool,
}

impl Counters {
    pub(crate) fn record_interest(&self, interest: Interest) {
        self.write_interest
            .store(interest.is_writable(), Ordering::Relaxed);
    }

    pub(crate) fn record_widen(&self) {
        self.widened.fetch_add(1, Ordering::Relaxed);
        self.record_interest(Interest::ReadWrite);
    }

    pub(crate) fn record_narrow(&self) {
        self.narrowed.fetch_add(1, Ordering::Relaxed);
        self.record_interest(Interest::Read);
    }

    pub(crate) fn record_pending(&self, delivered: usize) {
        self.events_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch(&self, delivered: usize) {
        self.dispatch_rounds.fetch_add(1, Ordering::Relaxed);
        self.record_pending(delivered);
    }

    pub(crate) fn record_flush(&self) {
        self.flush_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SchedulerStats {
        let interest = if self.write_interest.load(Ordering::Relaxed) {
            Interest::ReadWrite
        } else {
            Interest::Read
        };

        SchedulerStats {
            widened: self.widened.load(Ordering::Relaxed),
            narrowed: self.narrowed.load(Ordering::Relaxed),
            dispatch_rounds: self.dispatch_rounds.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            flush_attempts: self.flush_attempts.load(Ordering::Relaxed),
            interest,
        }
    }
}

/// Point-in-time view of a scheduler's activity.
///
/// Counts accumulate over every run of the same [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Transitions from read-only to read-write interest.
    pub widened: u64,

    /// Transitions from read-write back to read-only interest.
    pub narrowed: u64,

    /// Dispatches triggered by read readiness.
    pub dispatch_rounds: u64,

    pub events_delivered: u64,
    pub flush_attempts: u64,

    /// Interest the connection descriptor is currently registered with.
    pub interest: Interest,
}
