//! Atomic counters for controller observability.
//!
//! All counters use relaxed ordering; they are diagnostic only and never
//! feed back into control decisions.

use std::sync::atomic::{AtomicU64, Ordering};

/// Controller event counters.
#[derive(Debug)]
pub struct ControlMetrics {
    /// Samples queued by the sensor port.
    pub samples_accepted: AtomicU64,
    /// Samples discarded because the sample channel was full.
    pub samples_dropped: AtomicU64,
    /// Samples rejected at the port (zero sensor count).
    pub samples_rejected: AtomicU64,
    /// Samples folded into the history by the ROC task.
    pub samples_processed: AtomicU64,
    /// Stability evaluations skipped because maintenance was active.
    pub stability_holds: AtomicU64,
    /// Stable-to-unstable edges.
    pub instability_onsets: AtomicU64,
    /// Scancodes queued by the keyboard port.
    pub keys_accepted: AtomicU64,
    /// Scancodes discarded because the key channel was full.
    pub keys_dropped: AtomicU64,
    /// Scancodes with no bound command.
    pub keys_unmapped: AtomicU64,
    /// Button edges seen.
    pub maintenance_toggles: AtomicU64,
    /// FSM iterations run.
    pub fsm_ticks: AtomicU64,
    /// Loads disconnected by the controller.
    pub sheds: AtomicU64,
    /// Loads reconnected by the controller.
    pub reconnects: AtomicU64,
}

impl ControlMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            samples_accepted: AtomicU64::new(0),
            samples_dropped: AtomicU64::new(0),
            samples_rejected: AtomicU64::new(0),
            samples_processed: AtomicU64::new(0),
            stability_holds: AtomicU64::new(0),
            instability_onsets: AtomicU64::new(0),
            keys_accepted: AtomicU64::new(0),
            keys_dropped: AtomicU64::new(0),
            keys_unmapped: AtomicU64::new(0),
            maintenance_toggles: AtomicU64::new(0),
            fsm_ticks: AtomicU64::new(0),
            sheds: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            samples_accepted: Self::get(&self.samples_accepted),
            samples_dropped: Self::get(&self.samples_dropped),
            samples_rejected: Self::get(&self.samples_rejected),
            samples_processed: Self::get(&self.samples_processed),
            stability_holds: Self::get(&self.stability_holds),
            instability_onsets: Self::get(&self.instability_onsets),
            keys_accepted: Self::get(&self.keys_accepted),
            keys_dropped: Self::get(&self.keys_dropped),
            keys_unmapped: Self::get(&self.keys_unmapped),
            maintenance_toggles: Self::get(&self.maintenance_toggles),
            fsm_ticks: Self::get(&self.fsm_ticks),
            sheds: Self::get(&self.sheds),
            reconnects: Self::get(&self.reconnects),
        }
    }
}

impl Default for ControlMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`ControlMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub samples_accepted: u64,
    pub samples_dropped: u64,
    pub samples_rejected: u64,
    pub samples_processed: u64,
    pub stability_holds: u64,
    pub instability_onsets: u64,
    pub keys_accepted: u64,
    pub keys_dropped: u64,
    pub keys_unmapped: u64,
    pub maintenance_toggles: u64,
    pub fsm_ticks: u64,
    pub sheds: u64,
    pub reconnects: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let snap = ControlMetrics::new().snapshot();
        assert_eq!(snap, MetricsSnapshot::default());
    }

    #[test]
    fn increment_works() {
        let m = ControlMetrics::new();
        ControlMetrics::inc(&m.sheds);
        ControlMetrics::inc(&m.sheds);
        ControlMetrics::inc(&m.samples_dropped);
        let snap = m.snapshot();
        assert_eq!(snap.sheds, 2);
        assert_eq!(snap.samples_dropped, 1);
        assert_eq!(snap.reconnects, 0);
    }
}
