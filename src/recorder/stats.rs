use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::bus::{BusReply, TransportError};

/// Counters for what happened to outbound calls. Async failures nobody
/// listens for still show up here.
#[derive(Debug, Default)]
pub struct RecorderStats {
    dispatched: AtomicU64,
    delivered: AtomicU64,
    transport_failures: AtomicU64,
    cancelled: AtomicU64,
    skipped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub dispatched: u64,
    pub delivered: u64,
    pub transport_failures: u64,
    pub cancelled: u64,
    /// Calls not sent because submission is disabled.
    pub skipped: u64,
}

impl StatsSnapshot {
    /// Dispatched calls that have not completed yet.
    pub fn in_flight(&self) -> u64 {
        self.dispatched
            .saturating_sub(self.delivered + self.transport_failures + self.cancelled)
    }
}

impl RecorderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: &Result<BusReply, TransportError>) {
        let counter = match outcome {
            Ok(_) => &self.delivered,
            Err(TransportError::Cancelled) => &self.cancelled,
            Err(_) => &self.transport_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}
