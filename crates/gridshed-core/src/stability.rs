//! Stability verdict and instability-onset tracking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::thresholds::Thresholds;

/// `true` unless the frequency is under threshold or the absolute rate of
/// change meets or exceeds its threshold.
#[must_use]
pub fn is_stable(freq_hz: f64, roc_hz_per_s: f64, thresholds: Thresholds) -> bool {
    let under_frequency = freq_hz < thresholds.freq_hz;
    let too_steep = roc_hz_per_s.abs() >= thresholds.roc_hz_per_s;
    !(under_frequency || too_steep)
}

/// Edge reported by [`StabilityFlag::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityEdge {
    Unchanged,
    BecameUnstable,
    BecameStable,
}

const STABLE: u64 = u64::MAX;

/// Shared stability flag, written by sample ingestion and polled by the FSM.
///
/// One atomic holds both the verdict and the onset: `STABLE`, or the clock
/// reading of the most recent unstable evaluation. Every unstable sample
/// moves the onset forward, so the recorded shed latency runs from the last
/// detection before the shed.
#[derive(Debug)]
pub struct StabilityFlag {
    onset_nanos: AtomicU64,
}

impl StabilityFlag {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            onset_nanos: AtomicU64::new(STABLE),
        }
    }

    #[must_use]
    pub fn is_stable(&self) -> bool {
        self.onset().is_none()
    }

    /// Time of the latest unstable evaluation, or `None` while stable.
    ///
    /// A single load, so the verdict and onset always agree.
    #[must_use]
    pub fn onset(&self) -> Option<Duration> {
        match self.onset_nanos.load(Ordering::Acquire) {
            STABLE => None,
            nanos => Some(Duration::from_nanos(nanos)),
        }
    }

    /// Publish a fresh verdict observed at `now`.
    pub fn set(&self, stable: bool, now: Duration) -> StabilityEdge {
        let next = if stable {
            STABLE
        } else {
            u64::try_from(now.as_nanos()).map_or(STABLE - 1, |n| n.min(STABLE - 1))
        };
        let previous = self.onset_nanos.swap(next, Ordering::AcqRel);
        match (previous == STABLE, stable) {
            (true, false) => StabilityEdge::BecameUnstable,
            (false, true) => StabilityEdge::BecameStable,
            _ => StabilityEdge::Unchanged,
        }
    }
}

impl Default for StabilityFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Thresholds = Thresholds::new(50.0, 10.0);

    #[test]
    fn verdict_truth_table() {
        assert!(is_stable(50.0, 0.0, T));
        assert!(is_stable(50.0, 9.99, T));
        assert!(is_stable(50.0, -9.99, T));
        assert!(!is_stable(49.99, 0.0, T));
        assert!(!is_stable(50.0, 10.0, T));
        assert!(!is_stable(50.0, -10.0, T));
        assert!(!is_stable(48.0, -150.0, T));
    }

    #[test]
    fn onset_follows_the_latest_unstable_sample() {
        let flag = StabilityFlag::new();
        assert!(flag.is_stable());
        assert_eq!(flag.onset(), None);

        assert_eq!(
            flag.set(false, Duration::from_millis(10)),
            StabilityEdge::BecameUnstable
        );
        let t0 = Duration::from_millis(20);
        assert_eq!(flag.set(false, t0), StabilityEdge::Unchanged);
        assert_eq!(flag.onset(), Some(t0), "repeat detection moves the onset");
        assert!(!flag.is_stable());

        assert_eq!(
            flag.set(true, Duration::from_millis(30)),
            StabilityEdge::BecameStable
        );
        assert_eq!(flag.onset(), None);
        assert_eq!(
            flag.set(true, Duration::from_millis(40)),
            StabilityEdge::Unchanged
        );

        let t1 = Duration::from_millis(50);
        assert_eq!(flag.set(false, t1), StabilityEdge::BecameUnstable);
        assert_eq!(flag.onset(), Some(t1));
    }

    #[test]
    fn unstable_at_time_zero_is_not_stable() {
        let flag = StabilityFlag::new();
        flag.set(false, Duration::ZERO);
        assert_eq!(flag.onset(), Some(Duration::ZERO));
        assert!(!flag.is_stable());
    }
}
