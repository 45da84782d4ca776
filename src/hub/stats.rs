use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Diagnostic counters. Nothing here feeds back into routing.
#[derive(Debug, Default)]
pub struct HubStats {
    signals_relayed: AtomicU64,
    signals_dropped: AtomicU64,
    chat_messages: AtomicU64,
    deliveries_failed: AtomicU64,
    joins_rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub signals_relayed: u64,
    pub signals_dropped: u64,
    pub chat_messages: u64,
    pub deliveries_failed: u64,
    pub joins_rejected: u64,
}

impl HubStats {
    pub(crate) fn signal_relayed(&self) {
        self.signals_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn signal_dropped(&self) {
        self.signals_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn chat_message(&self) {
        self.chat_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn deliveries_failed(&self, n: usize) {
        if n > 0 {
            self.deliveries_failed.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn join_rejected(&self) {
        self.joins_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            signals_relayed: self.signals_relayed.load(Ordering::Relaxed),
            signals_dropped: self.signals_dropped.load(Ordering::Relaxed),
            chat_messages: self.chat_messages.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
            joins_rejected: self.joins_rejected.load(Ordering::Relaxed),
        }
    }
}
