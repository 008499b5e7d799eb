//! Lock-free server counters.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters updated by the acceptor and the workers.
#[derive(Debug, Default)]
pub struct Stats {
    accepted: AtomicU64,
    rejected: AtomicU64,
    served: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
    in_service: AtomicUsize,
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Connections accepted from the listener
    pub accepted: u64,
    /// Connections closed on arrival because the queue was full
    pub rejected: u64,
    /// Exchanges that ended with a reply written
    pub served: u64,
    /// Exchanges abandoned on read, parse or write failure
    pub failed: u64,
    /// Connections still queued when the server stopped
    pub abandoned: u64,
    /// Connections currently held by a worker
    pub in_service: usize,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self, count: u64) {
        self.abandoned.fetch_add(count, Ordering::Relaxed);
    }

    /// A worker took a connection off the queue.
    pub fn begin_service(&self) {
        self.in_service.fetch_add(1, Ordering::Relaxed);
    }

    /// A worker closed the connection it held.
    pub fn end_service(&self, success: bool) {
        if success {
            self.served.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.in_service.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            served: self.served.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            in_service: self.in_service.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_accounting() {
        let stats = Stats::new();
        stats.record_accepted();
        stats.record_accepted();
        stats.record_accepted();
        stats.record_rejected();

        stats.begin_service();
        stats.begin_service();
        assert_eq!(stats.snapshot().in_service, 2);

        stats.end_service(true);
        stats.end_service(false);
        stats.record_abandoned(0);

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                accepted: 3,
                rejected: 1,
                served: 1,
                failed: 1,
                abandoned: 0,
                in_service: 0,
            }
        );
    }
}
