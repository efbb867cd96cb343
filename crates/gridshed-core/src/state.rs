//! Operating modes and their lock-free publication.
//!
//! Two single-word values cross task boundaries without a lock:
//! - [`SharedState`]: the FSM's current mode, written only by the FSM and
//!   read by sample ingestion (to hold stability during maintenance) and by
//!   telemetry.
//! - [`MaintenanceOverride`]: the button toggle, flipped from interrupt
//!   context and consumed first thing on every FSM iteration.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Controller operating mode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingState {
    /// All desired loads connected, watching for instability.
    #[default]
    NormalOperation,
    /// Shedding; one more load goes per expired debounce window.
    MonitoringUnstable,
    /// Grid recovered; reconnecting one load per expired debounce window.
    MonitoringStable,
    /// Manual override. No automatic action, stability evaluation paused.
    Maintenance,
}

impl OperatingState {
    pub const ALL: [Self; 4] = [
        Self::NormalOperation,
        Self::MonitoringUnstable,
        Self::MonitoringStable,
        Self::Maintenance,
    ];

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::NormalOperation => 0,
            Self::MonitoringUnstable => 1,
            Self::MonitoringStable => 2,
            Self::Maintenance => 3,
        }
    }

    /// Inverse of [`Self::as_u8`]; unknown values decode as `NormalOperation`.
    #[must_use]
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::MonitoringUnstable,
            2 => Self::MonitoringStable,
            3 => Self::Maintenance,
            _ => Self::NormalOperation,
        }
    }

    /// Short machine-friendly name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NormalOperation => "normal",
            Self::MonitoringUnstable => "monitoring_unstable",
            Self::MonitoringStable => "monitoring_stable",
            Self::Maintenance => "maintenance",
        }
    }

    /// Parse [`Self::as_str`] output (case-insensitive).
    #[must_use]
    pub fn from_str_loose(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "normal" | "normal_operation" => Some(Self::NormalOperation),
            "monitoring_unstable" | "unstable" => Some(Self::MonitoringUnstable),
            "monitoring_stable" | "stable" => Some(Self::MonitoringStable),
            "maintenance" => Some(Self::Maintenance),
            _ => None,
        }
    }

    /// Switches may only disconnect while a monitoring episode is running.
    #[must_use]
    pub const fn is_monitoring(self) -> bool {
        matches!(self, Self::MonitoringUnstable | Self::MonitoringStable)
    }
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NormalOperation => "NORMAL OPERATION",
            Self::MonitoringUnstable => "MONITORING (UNSTABLE)",
            Self::MonitoringStable => "MONITORING (STABLE)",
            Self::Maintenance => "MAINTENANCE MODE",
        };
        f.write_str(label)
    }
}

/// Atomically published [`OperatingState`].
#[derive(Debug)]
pub struct SharedState {
    raw: AtomicU8,
}

impl SharedState {
    #[must_use]
    pub const fn new(initial: OperatingState) -> Self {
        Self {
            raw: AtomicU8::new(initial.as_u8()),
        }
    }

    #[must_use]
    pub fn load(&self) -> OperatingState {
        OperatingState::from_u8(self.raw.load(Ordering::Acquire))
    }

    pub fn store(&self, state: OperatingState) {
        self.raw.store(state.as_u8(), Ordering::Release);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(OperatingState::default())
    }
}

/// Maintenance request flag driven by the push button.
///
/// Each button edge flips the request. The FSM compares the request against
/// its own mode on the next iteration; since the request is a single bit,
/// a second toggle cancels the first rather than stacking.
#[derive(Debug, Default)]
pub struct MaintenanceOverride {
    engaged: AtomicBool,
}

impl MaintenanceOverride {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            engaged: AtomicBool::new(false),
        }
    }

    /// Flip the request; returns the new value. Safe to call from any context.
    pub fn toggle(&self) -> bool {
        !self.engaged.fetch_xor(true, Ordering::AcqRel)
    }

    #[must_use]
    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_round_trip_and_fallback() {
        for state in OperatingState::ALL {
            assert_eq!(OperatingState::from_u8(state.as_u8()), state);
            assert_eq!(OperatingState::from_str_loose(state.as_str()), Some(state));
        }
        assert_eq!(OperatingState::from_u8(200), OperatingState::NormalOperation);
        assert_eq!(OperatingState::from_str_loose("bogus"), None);
    }

    #[test]
    fn shared_state_publishes() {
        let shared = SharedState::default();
        assert_eq!(shared.load(), OperatingState::NormalOperation);
        shared.store(OperatingState::Maintenance);
        assert_eq!(shared.load(), OperatingState::Maintenance);
    }

    #[test]
    fn override_toggles() {
        let button = MaintenanceOverride::new();
        assert!(!button.is_engaged());
        assert!(button.toggle());
        assert!(button.is_engaged());
        assert!(!button.toggle());
        assert!(!button.is_engaged());
    }

    #[test]
    fn display_labels() {
        assert_eq!(OperatingState::Maintenance.to_string(), "MAINTENANCE MODE");
        assert!(OperatingState::MonitoringStable.is_monitoring());
        assert!(!OperatingState::NormalOperation.is_monitoring());
    }
}
