//! Threaded runs against a synthetic grid.
//!
//! The grid sits at a nominal frequency until a disturbance removes
//! `dip_hz` of it for `dip_len`. Each shed load gives back
//! `relief_per_load_hz`, so the controller's actions feed back into the
//! frequency it measures. Frequency moves toward its target with
//! first-order smoothing, one step per sample.

use std::thread;
use std::time::{Duration, Instant};

use gridshed_core::config::ControllerConfig;
use gridshed_core::loads::LoadBank;
use gridshed_core::runtime::{ControlSystem, OutputLatch, SwitchBank};
use gridshed_core::sampling::FrequencySample;

use crate::error::HarnessError;
use crate::report::LiveReport;
use crate::structured_log::{LogEmitter, LogEntry, LogLevel};

#[derive(Debug, Clone, PartialEq)]
pub struct GridProfile {
    pub nominal_hz: f64,
    pub dip_hz: f64,
    pub dip_start: Duration,
    pub dip_len: Duration,
    pub relief_per_load_hz: f64,
    /// Fraction of the gap to the target closed per sample, in `(0, 1]`.
    pub smoothing: f64,
}

impl Default for GridProfile {
    fn default() -> Self {
        Self {
            nominal_hz: 50.2,
            dip_hz: 2.0,
            dip_start: Duration::from_millis(500),
            dip_len: Duration::from_secs(3),
            relief_per_load_hz: 0.6,
            smoothing: 0.3,
        }
    }
}

impl GridProfile {
    /// Frequency the grid settles toward at `elapsed` with `shed` loads off.
    #[must_use]
    pub fn target(&self, elapsed: Duration, shed: u32) -> f64 {
        let in_dip = elapsed >= self.dip_start && elapsed < self.dip_start + self.dip_len;
        if !in_dip {
            return self.nominal_hz;
        }
        let relieved = self.nominal_hz - self.dip_hz + self.relief_per_load_hz * f64::from(shed);
        relieved.min(self.nominal_hz)
    }
}

/// Smoothed grid frequency state.
#[derive(Debug, Clone)]
pub struct SyntheticGrid {
    profile: GridProfile,
    hz: f64,
}

impl SyntheticGrid {
    #[must_use]
    pub fn new(profile: GridProfile) -> Self {
        let hz = profile.nominal_hz;
        Self { profile, hz }
    }

    /// Advance one sample and return the new frequency.
    pub fn step(&mut self, elapsed: Duration, shed: u32) -> f64 {
        let target = self.profile.target(elapsed, shed);
        let alpha = self.profile.smoothing.clamp(f64::EPSILON, 1.0);
        self.hz += (target - self.hz) * alpha;
        self.hz
    }
}

#[derive(Debug, Clone)]
pub struct LiveOptions {
    pub duration: Duration,
    pub sample_period: Duration,
    pub profile: GridProfile,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(6),
            sample_period: Duration::from_millis(20),
            profile: GridProfile::default(),
        }
    }
}

/// Run the threaded controller against a synthetic grid for `options.duration`.
pub fn run_live(
    config: ControllerConfig,
    options: &LiveOptions,
    log: &mut LogEmitter,
) -> Result<LiveReport, HarnessError> {
    let bank = LoadBank::all_connected(config.load_count);
    let switches = SwitchBank::new(bank.desired_bits());
    let latch = OutputLatch::new();
    let system = ControlSystem::builder(config)
        .switches(switches)
        .outputs(latch.clone())
        .loads(bank)
        .spawn()?;

    log.set_scenario("live");
    log.emit_entry(
        LogEntry::new(String::new(), LogLevel::Info, "live_start").with_details(
            serde_json::json!({
                "duration_ms": u64::try_from(options.duration.as_millis()).unwrap_or(u64::MAX),
                "nominal_hz": options.profile.nominal_hz,
                "dip_hz": options.profile.dip_hz,
            }),
        ),
    )?;

    let mut grid = SyntheticGrid::new(options.profile.clone());
    let started = Instant::now();
    let mut posted = 0u64;
    let mut state_changes = 0u64;
    let mut last_state = system.context().state.load();

    while started.elapsed() < options.duration {
        let shed = latch.get().shed_indicator.count_ones();
        let hz = grid.step(started.elapsed(), shed);
        system.sensor().post(FrequencySample::from_hz(hz));
        posted += 1;

        let state = system.context().state.load();
        if state != last_state {
            state_changes += 1;
            log.emit_entry(
                LogEntry::new(String::new(), LogLevel::Info, "state_change")
                    .with_at(system.context().now())
                    .with_state(state)
                    .with_stable(system.context().stability.is_stable())
                    .with_freq(hz)
                    .with_details(serde_json::json!({ "from": last_state.as_str() })),
            )?;
            last_state = state;
        }
        thread::sleep(options.sample_period);
    }

    let snapshot = system.telemetry();
    system.shutdown()?;
    let report = LiveReport::build(started.elapsed(), posted, state_changes, &snapshot);
    log.emit_entry(
        LogEntry::new(String::new(), LogLevel::Info, "live_end")
            .with_state(snapshot.state)
            .with_details(serde_json::to_value(&report.latency)?),
    )?;
    log.flush()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_follows_dip_and_relief() {
        let p = GridProfile::default();
        assert_eq!(p.target(Duration::ZERO, 0), 50.2);
        let mid = p.dip_start + Duration::from_millis(10);
        assert!((p.target(mid, 0) - 48.2).abs() < 1e-9);
        assert!((p.target(mid, 2) - 49.4).abs() < 1e-9);
        assert_eq!(p.target(mid, 10), 50.2, "relief never overshoots nominal");
        assert_eq!(p.target(p.dip_start + p.dip_len, 0), 50.2);
    }

    #[test]
    fn grid_approaches_target_smoothly() {
        let mut grid = SyntheticGrid::new(GridProfile::default());
        let mid = Duration::from_secs(1);
        let first = grid.step(mid, 0);
        assert!(first < 50.2 && first > 48.2);
        let hz = (0..100).map(|_| grid.step(mid, 0)).last().unwrap();
        assert!((hz - 48.2).abs() < 1e-6);
    }
}
