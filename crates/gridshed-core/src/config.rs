//! Controller configuration.
//!
//! Defaults match the reference board setup: 50 Hz / 10 Hz/s thresholds,
//! a 500 ms debounce window, a 5 ms FSM polling interval and five loads.
//! Every field can be overridden from the environment:
//!
//! - `GRIDSHED_FREQ_THRESHOLD` (Hz)
//! - `GRIDSHED_ROC_THRESHOLD` (Hz/s)
//! - `GRIDSHED_DEBOUNCE_MS`
//! - `GRIDSHED_POLL_MS`
//! - `GRIDSHED_LOAD_COUNT`
//! - `GRIDSHED_SAMPLE_QUEUE`
//! - `GRIDSHED_KEY_QUEUE`
//!
//! Values that fail to parse are ignored and the default is kept.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{ControlError, Result};
use crate::loads::MAX_LOADS;

pub const DEFAULT_FREQ_THRESHOLD_HZ: f64 = 50.0;
pub const DEFAULT_ROC_THRESHOLD_HZ_PER_S: f64 = 10.0;
pub const DEFAULT_DEBOUNCE_PERIOD: Duration = Duration::from_millis(500);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);
pub const DEFAULT_LOAD_COUNT: usize = 5;
pub const DEFAULT_SAMPLE_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_KEY_QUEUE_CAPACITY: usize = 10;

/// Construction-time parameters for a [`crate::runtime::ControlSystem`].
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Initial under-frequency threshold.
    pub freq_threshold_hz: f64,
    /// Initial absolute rate-of-change threshold.
    pub roc_threshold_hz_per_s: f64,
    /// Debounce window between successive shed/reconnect actions.
    pub debounce_period: Duration,
    /// Sleep between FSM iterations.
    pub poll_interval: Duration,
    /// Number of controllable loads (`1..=32`).
    pub load_count: usize,
    /// Capacity of the sensor sample channel.
    pub sample_queue_capacity: usize,
    /// Capacity of the keyboard event channel.
    pub key_queue_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            freq_threshold_hz: DEFAULT_FREQ_THRESHOLD_HZ,
            roc_threshold_hz_per_s: DEFAULT_ROC_THRESHOLD_HZ_PER_S,
            debounce_period: DEFAULT_DEBOUNCE_PERIOD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            load_count: DEFAULT_LOAD_COUNT,
            sample_queue_capacity: DEFAULT_SAMPLE_QUEUE_CAPACITY,
            key_queue_capacity: DEFAULT_KEY_QUEUE_CAPACITY,
        }
    }
}

impl ControllerConfig {
    /// Defaults overlaid with any `GRIDSHED_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = parse_var::<f64, _>(&lookup, "GRIDSHED_FREQ_THRESHOLD") {
            cfg.freq_threshold_hz = v;
        }
        if let Some(v) = parse_var::<f64, _>(&lookup, "GRIDSHED_ROC_THRESHOLD") {
            cfg.roc_threshold_hz_per_s = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "GRIDSHED_DEBOUNCE_MS") {
            cfg.debounce_period = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "GRIDSHED_POLL_MS") {
            cfg.poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "GRIDSHED_LOAD_COUNT") {
            cfg.load_count = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "GRIDSHED_SAMPLE_QUEUE") {
            cfg.sample_queue_capacity = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "GRIDSHED_KEY_QUEUE") {
            cfg.key_queue_capacity = v;
        }
        cfg
    }

    /// Check structural fields. Thresholds are deliberately unchecked: the
    /// operator may push them anywhere, physical or not.
    pub fn validate(&self) -> Result<()> {
        if self.load_count == 0 || self.load_count > MAX_LOADS {
            return Err(ControlError::InvalidConfig {
                field: "load_count",
                reason: format!("must be in 1..={MAX_LOADS}, got {}", self.load_count),
            });
        }
        if self.debounce_period.is_zero() {
            return Err(ControlError::InvalidConfig {
                field: "debounce_period",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ControlError::InvalidConfig {
                field: "poll_interval",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.sample_queue_capacity == 0 {
            return Err(ControlError::InvalidConfig {
                field: "sample_queue_capacity",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.key_queue_capacity == 0 {
            return Err(ControlError::InvalidConfig {
                field: "key_queue_capacity",
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring unparseable {key}={raw:?}; keeping default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_board() {
        let cfg = ControllerConfig::default();
        assert_eq!(cfg.freq_threshold_hz, 50.0);
        assert_eq!(cfg.roc_threshold_hz_per_s, 10.0);
        assert_eq!(cfg.debounce_period, Duration::from_millis(500));
        assert_eq!(cfg.poll_interval, Duration::from_millis(5));
        assert_eq!(cfg.load_count, 5);
        assert_eq!(cfg.sample_queue_capacity, 100);
        assert_eq!(cfg.key_queue_capacity, 10);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = ControllerConfig::from_lookup(lookup_from(&[
            ("GRIDSHED_FREQ_THRESHOLD", "49.5"),
            ("GRIDSHED_ROC_THRESHOLD", " 7.5 "),
            ("GRIDSHED_DEBOUNCE_MS", "250"),
            ("GRIDSHED_LOAD_COUNT", "8"),
        ]));
        assert_eq!(cfg.freq_threshold_hz, 49.5);
        assert_eq!(cfg.roc_threshold_hz_per_s, 7.5);
        assert_eq!(cfg.debounce_period, Duration::from_millis(250));
        assert_eq!(cfg.load_count, 8);
        assert_eq!(cfg.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn unparseable_values_keep_defaults() {
        let cfg = ControllerConfig::from_lookup(lookup_from(&[
            ("GRIDSHED_FREQ_THRESHOLD", "fifty"),
            ("GRIDSHED_POLL_MS", "-3"),
        ]));
        assert_eq!(cfg.freq_threshold_hz, DEFAULT_FREQ_THRESHOLD_HZ);
        assert_eq!(cfg.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn validate_rejects_structural_nonsense() {
        let mut cfg = ControllerConfig {
            load_count: 0,
            ..ControllerConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ControlError::InvalidConfig {
                field: "load_count",
                ..
            })
        ));
        cfg.load_count = MAX_LOADS + 1;
        assert!(cfg.validate().is_err());
        cfg.load_count = MAX_LOADS;
        assert!(cfg.validate().is_ok());

        cfg.debounce_period = Duration::ZERO;
        assert!(matches!(
            cfg.validate(),
            Err(ControlError::InvalidConfig {
                field: "debounce_period",
                ..
            })
        ));
    }

    #[test]
    fn non_physical_thresholds_are_accepted() {
        let cfg = ControllerConfig {
            freq_threshold_hz: -20.0,
            roc_threshold_hz_per_s: 0.0,
            ..ControllerConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }
}
