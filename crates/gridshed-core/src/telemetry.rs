//! Read-only snapshots for render and reporting consumers.
//!
//! A snapshot takes each lock in turn and releases it before taking the
//! next, so the parts are individually consistent but may come from
//! slightly different instants.

use std::fmt::Write as _;
use std::time::Duration;

use crate::context::ControlContext;
use crate::metrics::MetricsSnapshot;
use crate::sampling::SampleHistory;
use crate::shed_stats::ShedStatistics;
use crate::state::OperatingState;
use crate::thresholds::Thresholds;

#[derive(Debug, Clone)]
pub struct TelemetrySnapshot {
    pub at: Duration,
    pub thresholds: Thresholds,
    pub state: OperatingState,
    pub stable: bool,
    pub maintenance_requested: bool,
    pub stats: ShedStatistics,
    pub history: SampleHistory,
    pub metrics: MetricsSnapshot,
}

impl TelemetrySnapshot {
    #[must_use]
    pub fn capture(ctx: &ControlContext) -> Self {
        let thresholds = ctx.thresholds.read();
        let stats = ctx.stats.snapshot();
        let history = ctx.history.lock().clone();
        Self {
            at: ctx.now(),
            thresholds,
            state: ctx.state.load(),
            stable: ctx.stability.is_stable(),
            maintenance_requested: ctx.maintenance.is_engaged(),
            stats,
            history,
            metrics: ctx.metrics.snapshot(),
        }
    }

    /// Operator status text, one line per item.
    #[must_use]
    pub fn status_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Frequency threshold: {:.1}", self.thresholds.freq_hz),
            format!("ROC threshold: {:.1}", self.thresholds.roc_hz_per_s),
            format!("Current state: {}", self.state),
            format!(
                "System status: {}",
                if self.stable { "STABLE" } else { "UNSTABLE" }
            ),
        ];

        let mut recent = String::from("Recent shed latencies (ms):");
        for latency in self.stats.window.iter().filter(|d| !d.is_zero()) {
            let _ = write!(recent, " {}", millis(*latency));
        }
        lines.push(recent);
        lines.push(format!(
            "Min: {} ms  Max: {} ms  Avg: {} ms  Events: {}",
            self.stats.min.map_or_else(|| "-".to_owned(), millis),
            self.stats.max.map_or_else(|| "-".to_owned(), millis),
            millis(self.stats.average),
            self.stats.event_count
        ));
        if let Some(point) = self.history.latest() {
            lines.push(format!(
                "Latest: {:.3} Hz  {:.3} Hz/s",
                point.freq_hz, point.roc_hz_per_s
            ));
        }
        lines
    }
}

fn millis(d: Duration) -> String {
    format!("{:.3}", d.as_secs_f64() * 1_000.0)
}
