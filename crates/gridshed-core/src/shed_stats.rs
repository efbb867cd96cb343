//! Shed-latency statistics.
//!
//! Keeps the five most recent reaction latencies in a FIFO window. Min and
//! max are rescanned over the filled slots after every update. The average
//! is the window sum divided by the lifetime event count, so once more than
//! five events have been seen it drifts below a true moving average.

use std::time::Duration;

use parking_lot::Mutex;

/// Number of latencies retained.
pub const LATENCY_WINDOW: usize = 5;

/// Point-in-time view of the shed statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShedStatistics {
    /// Most recent latency.
    pub last: Option<Duration>,
    /// Recent latencies, oldest first; `Duration::ZERO` marks an unfilled slot.
    pub window: [Duration; LATENCY_WINDOW],
    pub min: Option<Duration>,
    pub max: Option<Duration>,
    /// `sum(window) / event_count`.
    pub average: Duration,
    /// Lifetime number of recorded events.
    pub event_count: u64,
}

impl ShedStatistics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: None,
            window: [Duration::ZERO; LATENCY_WINDOW],
            min: None,
            max: None,
            average: Duration::ZERO,
            event_count: 0,
        }
    }

    /// Record one latency and refresh the derived figures.
    pub fn record(&mut self, latency: Duration) {
        let filled = usize::try_from(self.event_count).unwrap_or(usize::MAX);
        if filled < LATENCY_WINDOW {
            self.window[filled] = latency;
        } else {
            self.window.rotate_left(1);
            self.window[LATENCY_WINDOW - 1] = latency;
        }
        self.event_count += 1;
        self.last = Some(latency);

        let filled_slots = self.window.iter().copied().filter(|d| !d.is_zero());
        self.min = filled_slots.clone().min();
        self.max = filled_slots.max();

        let sum: Duration = self.window.iter().sum();
        let avg_nanos = sum.as_nanos() / u128::from(self.event_count);
        self.average = Duration::from_nanos(u64::try_from(avg_nanos).unwrap_or(u64::MAX));
    }
}

/// Lock-protected statistics; written by the FSM, read by telemetry.
#[derive(Debug, Default)]
pub struct ShedStatsTracker {
    inner: Mutex<ShedStatistics>,
}

impl ShedStatsTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ShedStatistics::new()),
        }
    }

    pub fn record(&self, latency: Duration) {
        self.inner.lock().record(latency);
    }

    #[must_use]
    pub fn snapshot(&self) -> ShedStatistics {
        *self.inner.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn first_five_fill_in_order() {
        let mut stats = ShedStatistics::new();
        for v in [10, 20, 30] {
            stats.record(ms(v));
        }
        assert_eq!(stats.window, [ms(10), ms(20), ms(30), ms(0), ms(0)]);
        assert_eq!(stats.min, Some(ms(10)), "unfilled slots must be ignored");
        assert_eq!(stats.max, Some(ms(30)));
        assert_eq!(stats.average, ms(20));
        assert_eq!(stats.last, Some(ms(30)));
        assert_eq!(stats.event_count, 3);
    }

    #[test]
    fn window_shifts_after_fifth_event() {
        let mut stats = ShedStatistics::new();
        for v in [10, 20, 30, 40, 50, 60, 5] {
            stats.record(ms(v));
        }
        assert_eq!(stats.window, [ms(30), ms(40), ms(50), ms(60), ms(5)]);
        assert_eq!(stats.min, Some(ms(5)));
        assert_eq!(stats.max, Some(ms(60)));
        assert_eq!(stats.event_count, 7);
    }

    #[test]
    fn average_divides_by_lifetime_count() {
        let mut stats = ShedStatistics::new();
        for _ in 0..10 {
            stats.record(ms(100));
        }
        // window sum 500 ms over 10 events
        assert_eq!(stats.average, ms(50));
    }

    #[test]
    fn tracker_snapshot_reflects_records() {
        let tracker = ShedStatsTracker::new();
        assert_eq!(tracker.snapshot().event_count, 0);
        tracker.record(ms(7));
        let snap = tracker.snapshot();
        assert_eq!(snap.event_count, 1);
        assert_eq!(snap.min, Some(ms(7)));
        assert_eq!(snap.max, Some(ms(7)));
    }
}
