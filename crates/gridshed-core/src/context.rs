//! Shared state handed to every controller task.
//!
//! Three independent locks guard three logical groups and are never held
//! together: the sample history, the threshold pair, and the shed
//! statistics. Mode, stability and the maintenance request are atomics.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::MonotonicClock;
use crate::config::ControllerConfig;
use crate::metrics::ControlMetrics;
use crate::sampling::SampleHistory;
use crate::shed_stats::ShedStatsTracker;
use crate::stability::StabilityFlag;
use crate::state::{MaintenanceOverride, SharedState};
use crate::thresholds::{ThresholdStore, Thresholds};

pub struct ControlContext {
    pub history: Mutex<SampleHistory>,
    pub thresholds: ThresholdStore,
    pub stats: ShedStatsTracker,
    pub stability: StabilityFlag,
    pub state: SharedState,
    pub maintenance: MaintenanceOverride,
    pub metrics: ControlMetrics,
    clock: Arc<dyn MonotonicClock>,
}

impl ControlContext {
    #[must_use]
    pub fn new(config: &ControllerConfig, clock: Arc<dyn MonotonicClock>) -> Self {
        Self {
            history: Mutex::new(SampleHistory::new()),
            thresholds: ThresholdStore::new(Thresholds::new(
                config.freq_threshold_hz,
                config.roc_threshold_hz_per_s,
            )),
            stats: ShedStatsTracker::new(),
            stability: StabilityFlag::new(),
            state: SharedState::default(),
            maintenance: MaintenanceOverride::new(),
            metrics: ControlMetrics::new(),
            clock,
        }
    }

    /// Current reading of the context clock.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.clock.now()
    }
}

impl std::fmt::Debug for ControlContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlContext")
            .field("state", &self.state.load())
            .field("stable", &self.stability.is_stable())
            .field("thresholds", &self.thresholds.read())
            .finish_non_exhaustive()
    }
}
