//! Fixed-period, manually rearmed one-shot timer.
//!
//! Expiry is a pure deadline comparison against the caller's clock reading,
//! so there is no timer callback context. Once expired the timer stays
//! expired until [`DebounceTimer::rearm`] is called; it never rearms itself.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceTimer {
    period: Duration,
    deadline: Option<Duration>,
}

impl DebounceTimer {
    /// A disarmed timer. It reports not-expired until first armed.
    #[must_use]
    pub const fn new(period: Duration) -> Self {
        Self {
            period,
            deadline: None,
        }
    }

    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Abort any pending countdown and start a fresh one from `now`.
    pub fn rearm(&mut self, now: Duration) {
        self.deadline = Some(now.saturating_add(self.period));
    }

    /// Non-blocking poll.
    #[must_use]
    pub fn has_expired(&self, now: Duration) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Time left before expiry; `None` when disarmed.
    #[must_use]
    pub fn remaining(&self, now: Duration) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_sub(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_millis(500);

    #[test]
    fn disarmed_timer_never_expires() {
        let timer = DebounceTimer::new(PERIOD);
        assert!(!timer.has_expired(Duration::from_secs(3600)));
        assert_eq!(timer.remaining(Duration::ZERO), None);
    }

    #[test]
    fn expires_at_deadline_and_stays_expired() {
        let mut timer = DebounceTimer::new(PERIOD);
        timer.rearm(Duration::from_millis(100));
        assert!(!timer.has_expired(Duration::from_millis(599)));
        assert!(timer.has_expired(Duration::from_millis(600)));
        assert!(timer.has_expired(Duration::from_millis(10_000)));
    }

    #[test]
    fn rearm_restarts_countdown() {
        let mut timer = DebounceTimer::new(PERIOD);
        timer.rearm(Duration::ZERO);
        timer.rearm(Duration::from_millis(400));
        assert!(!timer.has_expired(Duration::from_millis(600)));
        assert_eq!(
            timer.remaining(Duration::from_millis(600)),
            Some(Duration::from_millis(300))
        );
        assert!(timer.has_expired(Duration::from_millis(900)));
    }
}
