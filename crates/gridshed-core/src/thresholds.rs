//! Operator-adjustable stability thresholds.
//!
//! One writer (the keyboard consumer) and several readers (sample
//! evaluation, telemetry) share a [`ThresholdStore`]. There is no bounds
//! checking: an operator can drive either threshold to a non-physical value.

use parking_lot::RwLock;

/// Amount each key press moves a threshold.
pub const THRESHOLD_STEP: f64 = 0.5;

/// PS/2 set-2 extended scancodes bound to threshold commands.
pub const SCANCODE_UP: u8 = 0x75;
pub const SCANCODE_DOWN: u8 = 0x72;
pub const SCANCODE_PAGE_UP: u8 = 0x7D;
pub const SCANCODE_PAGE_DOWN: u8 = 0x7A;

/// The threshold pair consulted by stability evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Below this frequency the grid is unstable.
    pub freq_hz: f64,
    /// At or above this absolute rate of change the grid is unstable.
    pub roc_hz_per_s: f64,
}

impl Thresholds {
    #[must_use]
    pub const fn new(freq_hz: f64, roc_hz_per_s: f64) -> Self {
        Self {
            freq_hz,
            roc_hz_per_s,
        }
    }
}

/// Keyboard-driven threshold adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThresholdCommand {
    RaiseFreq,
    LowerFreq,
    RaiseRoc,
    LowerRoc,
}

impl ThresholdCommand {
    /// Map a decoded scancode. Unbound keys yield `None`.
    #[must_use]
    pub const fn from_scancode(code: u8) -> Option<Self> {
        match code {
            SCANCODE_UP => Some(Self::RaiseFreq),
            SCANCODE_DOWN => Some(Self::LowerFreq),
            SCANCODE_PAGE_UP => Some(Self::RaiseRoc),
            SCANCODE_PAGE_DOWN => Some(Self::LowerRoc),
            _ => None,
        }
    }
}

/// Lock-protected threshold pair.
#[derive(Debug)]
pub struct ThresholdStore {
    inner: RwLock<Thresholds>,
}

impl ThresholdStore {
    #[must_use]
    pub const fn new(initial: Thresholds) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    /// Copy out the current pair.
    #[must_use]
    pub fn read(&self) -> Thresholds {
        *self.inner.read()
    }

    /// Shift the frequency threshold by `delta` Hz and return the new pair.
    pub fn adjust_freq_threshold(&self, delta: f64) -> Thresholds {
        let mut guard = self.inner.write();
        guard.freq_hz += delta;
        *guard
    }

    /// Shift the rate-of-change threshold by `delta` Hz/s and return the new pair.
    pub fn adjust_roc_threshold(&self, delta: f64) -> Thresholds {
        let mut guard = self.inner.write();
        guard.roc_hz_per_s += delta;
        *guard
    }

    /// Apply one keyboard command.
    pub fn apply(&self, command: ThresholdCommand) -> Thresholds {
        let updated = match command {
            ThresholdCommand::RaiseFreq => self.adjust_freq_threshold(THRESHOLD_STEP),
            ThresholdCommand::LowerFreq => self.adjust_freq_threshold(-THRESHOLD_STEP),
            ThresholdCommand::RaiseRoc => self.adjust_roc_threshold(THRESHOLD_STEP),
            ThresholdCommand::LowerRoc => self.adjust_roc_threshold(-THRESHOLD_STEP),
        };
        log::debug!(
            "thresholds now freq={:.1} Hz roc={:.1} Hz/s after {command:?}",
            updated.freq_hz,
            updated.roc_hz_per_s
        );
        updated
    }
}
