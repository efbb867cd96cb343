//! Frequency sample ingestion and rate-of-change derivation.
//!
//! Samples land in a fixed 100-slot circular history. Each slot pairs the
//! frequency with a rate of change computed against the previous slot using
//! a harmonic-weighted difference,
//!
//! ```text
//! roc[i] = (f[i] - f[i-1]) * 2 * f[i] * f[i-1] / (f[i] + f[i-1])
//! ```
//!
//! which stays meaningful when samples arrive at irregular intervals (the
//! sensor fires once per measured period, so the spacing is `1 / f`).
//! The result is clamped from above at [`ROC_UPPER_CLAMP`] only; large
//! negative swings are kept as measured.

use crate::error::{ControlError, Result};

/// Number of slots in each circular buffer.
pub const HISTORY_LEN: usize = 100;

/// Sensor count-to-frequency constant: `Hz = SAMPLING_RATE_HZ / count`.
pub const SAMPLING_RATE_HZ: f64 = 16_000.0;

/// Upper bound applied to every computed rate of change.
pub const ROC_UPPER_CLAMP: f64 = 100.0;

/// One frequency measurement in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencySample {
    pub hz: f64,
}

impl FrequencySample {
    #[must_use]
    pub const fn from_hz(hz: f64) -> Self {
        Self { hz }
    }

    /// Convert a raw sensor count. A zero count has no finite frequency.
    pub fn from_count(count: u32) -> Result<Self> {
        if count == 0 {
            return Err(ControlError::ZeroSampleCount);
        }
        Ok(Self {
            hz: SAMPLING_RATE_HZ / f64::from(count),
        })
    }
}

/// Harmonic-weighted rate of change between two consecutive samples.
///
/// Returns `0.0` when both samples are zero (unfilled history) instead of NaN.
/// The upper clamp is applied by [`SampleHistory::push`], not here.
#[must_use]
pub fn rate_of_change(current: f64, previous: f64) -> f64 {
    let sum = current + previous;
    if sum == 0.0 {
        return 0.0;
    }
    (current - previous) * 2.0 * current * previous / sum
}

/// Result of writing one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RocPoint {
    /// Slot that was written.
    pub slot: usize,
    pub freq_hz: f64,
    pub roc_hz_per_s: f64,
}

/// Paired frequency / rate-of-change ring buffers sharing one write cursor.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    freq: [f64; HISTORY_LEN],
    roc: [f64; HISTORY_LEN],
    cursor: usize,
    total: u64,
}

impl SampleHistory {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            freq: [0.0; HISTORY_LEN],
            roc: [0.0; HISTORY_LEN],
            cursor: 0,
            total: 0,
        }
    }

    /// Slot the next sample will be written to. Also the oldest slot.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of samples ever written.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub const fn freq(&self) -> &[f64; HISTORY_LEN] {
        &self.freq
    }

    #[must_use]
    pub const fn roc(&self) -> &[f64; HISTORY_LEN] {
        &self.roc
    }

    /// Write `sample` at the cursor, derive its rate of change, then advance.
    pub fn push(&mut self, sample: FrequencySample) -> RocPoint {
        let slot = self.cursor;
        let prev = (slot + HISTORY_LEN - 1) % HISTORY_LEN;

        self.freq[slot] = sample.hz;
        let mut roc = rate_of_change(self.freq[slot], self.freq[prev]);
        if roc > ROC_UPPER_CLAMP {
            roc = ROC_UPPER_CLAMP;
        }
        self.roc[slot] = roc;

        self.cursor = (slot + 1) % HISTORY_LEN;
        self.total += 1;

        RocPoint {
            slot,
            freq_hz: sample.hz,
            roc_hz_per_s: roc,
        }
    }

    /// Most recently written point, if any.
    #[must_use]
    pub fn latest(&self) -> Option<RocPoint> {
        if self.total == 0 {
            return None;
        }
        let slot = (self.cursor + HISTORY_LEN - 1) % HISTORY_LEN;
        Some(RocPoint {
            slot,
            freq_hz: self.freq[slot],
            roc_hz_per_s: self.roc[slot],
        })
    }

    /// `(freq, roc)` pairs oldest first, starting at the cursor.
    pub fn chronological(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        (0..HISTORY_LEN).map(move |offset| {
            let slot = (self.cursor + offset) % HISTORY_LEN;
            (self.freq[slot], self.roc[slot])
        })
    }
}

impl Default for SampleHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_conversion() {
        assert_eq!(FrequencySample::from_count(320).map(|s| s.hz).ok(), Some(50.0));
        assert!(matches!(
            FrequencySample::from_count(0),
            Err(ControlError::ZeroSampleCount)
        ));
    }

    #[test]
    fn cursor_visits_every_slot_cyclically() {
        let mut history = SampleHistory::new();
        for n in 0..(HISTORY_LEN * 2 + 7) {
            let point = history.push(FrequencySample::from_hz(50.0));
            assert_eq!(point.slot, n % HISTORY_LEN);
            assert_eq!(history.cursor(), (n + 1) % HISTORY_LEN);
        }
        assert_eq!(history.total(), (HISTORY_LEN * 2 + 7) as u64);
    }

    #[test]
    fn each_sample_occupies_its_slot() {
        let mut history = SampleHistory::new();
        for n in 0..HISTORY_LEN {
            history.push(FrequencySample::from_hz(40.0 + n as f64 * 0.1));
        }
        for n in 0..HISTORY_LEN {
            assert!((history.freq()[n] - (40.0 + n as f64 * 0.1)).abs() < 1e-12);
        }
    }

    #[test]
    fn roc_uses_previous_slot_and_wraps_at_zero() {
        let mut history = SampleHistory::new();
        for _ in 0..HISTORY_LEN {
            history.push(FrequencySample::from_hz(50.0));
        }
        // slot 0 is compared against slot 99
        let point = history.push(FrequencySample::from_hz(49.0));
        assert_eq!(point.slot, 0);
        let expected = (49.0 - 50.0) * 2.0 * 49.0 * 50.0 / (49.0 + 50.0);
        assert!((point.roc_hz_per_s - expected).abs() < 1e-12);
        assert!((history.roc()[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn first_sample_against_empty_history_is_finite() {
        let mut history = SampleHistory::new();
        let point = history.push(FrequencySample::from_hz(50.0));
        assert_eq!(point.roc_hz_per_s, 0.0);
        assert_eq!(rate_of_change(0.0, 0.0), 0.0);
    }

    #[test]
    fn roc_is_clamped_above_only() {
        let mut history = SampleHistory::new();
        history.push(FrequencySample::from_hz(40.0));
        let up = history.push(FrequencySample::from_hz(60.0));
        assert_eq!(up.roc_hz_per_s, ROC_UPPER_CLAMP);

        let down = history.push(FrequencySample::from_hz(40.0));
        assert!(
            down.roc_hz_per_s < -ROC_UPPER_CLAMP,
            "negative swings must not be clamped, got {}",
            down.roc_hz_per_s
        );
        for roc in history.roc() {
            assert!(*roc <= ROC_UPPER_CLAMP);
        }
    }

    #[test]
    fn chronological_starts_at_oldest() {
        let mut history = SampleHistory::new();
        for n in 0..(HISTORY_LEN + 3) {
            history.push(FrequencySample::from_hz(n as f64));
        }
        let ordered: Vec<f64> = history.chronological().map(|(f, _)| f).collect();
        assert_eq!(ordered.len(), HISTORY_LEN);
        assert_eq!(ordered[0], 3.0);
        assert_eq!(ordered[HISTORY_LEN - 1], (HISTORY_LEN + 2) as f64);
        assert_eq!(history.latest().map(|p| p.freq_hz), Some((HISTORY_LEN + 2) as f64));
    }
}
