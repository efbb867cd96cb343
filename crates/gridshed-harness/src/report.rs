//! Run reports for scenario replays and live runs.

use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gridshed_core::fsm::LoadShedController;
use gridshed_core::metrics::MetricsSnapshot;
use gridshed_core::shed_stats::ShedStatistics;
use gridshed_core::telemetry::TelemetrySnapshot;

/// One expectation that did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectationFailure {
    pub step: usize,
    pub field: String,
    pub expected: String,
    pub actual: String,
}

/// Shed-latency figures in microseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub events: u64,
    pub last_us: Option<u64>,
    pub min_us: Option<u64>,
    pub max_us: Option<u64>,
    pub average_us: u64,
    pub window_us: Vec<u64>,
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

impl From<&ShedStatistics> for LatencySummary {
    fn from(stats: &ShedStatistics) -> Self {
        Self {
            events: stats.event_count,
            last_us: stats.last.map(micros),
            min_us: stats.min.map(micros),
            max_us: stats.max.map(micros),
            average_us: micros(stats.average),
            window_us: stats
                .window
                .iter()
                .filter(|d| !d.is_zero())
                .map(|d| micros(*d))
                .collect(),
        }
    }
}

/// Counter totals worth reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSummary {
    pub samples_accepted: u64,
    pub samples_dropped: u64,
    pub samples_rejected: u64,
    pub keys_accepted: u64,
    pub keys_dropped: u64,
    pub keys_unmapped: u64,
    pub fsm_ticks: u64,
    pub sheds: u64,
    pub reconnects: u64,
    pub instability_onsets: u64,
    pub maintenance_toggles: u64,
}

impl From<&MetricsSnapshot> for CounterSummary {
    fn from(m: &MetricsSnapshot) -> Self {
        Self {
            samples_accepted: m.samples_accepted,
            samples_dropped: m.samples_dropped,
            samples_rejected: m.samples_rejected,
            keys_accepted: m.keys_accepted,
            keys_dropped: m.keys_dropped,
            keys_unmapped: m.keys_unmapped,
            fsm_ticks: m.fsm_ticks,
            sheds: m.sheds,
            reconnects: m.reconnects,
            instability_onsets: m.instability_onsets,
            maintenance_toggles: m.maintenance_toggles,
        }
    }
}

/// Result of replaying one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub steps: usize,
    pub ticks: u64,
    pub final_state: String,
    pub connected: u32,
    pub shed_indicator: u32,
    pub latency: LatencySummary,
    pub counters: CounterSummary,
    pub failures: Vec<ExpectationFailure>,
}

impl ScenarioReport {
    #[must_use]
    pub fn build(
        name: &str,
        steps: usize,
        ticks: u64,
        failures: Vec<ExpectationFailure>,
        controller: &LoadShedController,
    ) -> Self {
        let ctx = controller.context();
        let outputs = controller.loads().outputs();
        Self {
            name: name.to_owned(),
            steps,
            ticks,
            final_state: controller.state().as_str().to_owned(),
            connected: outputs.connected,
            shed_indicator: outputs.shed_indicator,
            latency: LatencySummary::from(&ctx.stats.snapshot()),
            counters: CounterSummary::from(&ctx.metrics.snapshot()),
            failures,
        }
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of a threaded run against the synthetic grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveReport {
    pub duration_ms: u64,
    pub samples_posted: u64,
    pub final_state: String,
    pub state_changes: u64,
    pub latency: LatencySummary,
    pub counters: CounterSummary,
    pub status_lines: Vec<String>,
}

impl LiveReport {
    #[must_use]
    pub fn build(
        duration: Duration,
        samples_posted: u64,
        state_changes: u64,
        snapshot: &TelemetrySnapshot,
    ) -> Self {
        Self {
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            samples_posted,
            final_state: snapshot.state.as_str().to_owned(),
            state_changes,
            latency: LatencySummary::from(&snapshot.stats),
            counters: CounterSummary::from(&snapshot.metrics),
            status_lines: snapshot.status_lines(),
        }
    }
}

/// Aggregate of several scenario replays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub timestamp: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub scenarios: Vec<ScenarioReport>,
}

impl ReplaySummary {
    #[must_use]
    pub fn new(timestamp: String, scenarios: Vec<ScenarioReport>) -> Self {
        let passed = scenarios.iter().filter(|s| s.passed()).count();
        Self {
            timestamp,
            total: scenarios.len(),
            passed,
            failed: scenarios.len() - passed,
            scenarios,
        }
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Scenario replay\n");
        let _ = writeln!(out, "- Timestamp: {}", self.timestamp);
        let _ = writeln!(out, "- Total: {}", self.total);
        let _ = writeln!(out, "- Passed: {}", self.passed);
        let _ = writeln!(out, "- Failed: {}\n", self.failed);

        out.push_str("| Scenario | Ticks | Final state | Sheds | Reconnects | Status |\n");
        out.push_str("|----------|-------|-------------|-------|------------|--------|\n");
        for s in &self.scenarios {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} |",
                s.name,
                s.ticks,
                s.final_state,
                s.counters.sheds,
                s.counters.reconnects,
                if s.passed() { "PASS" } else { "FAIL" }
            );
        }
        for s in self.scenarios.iter().filter(|s| !s.passed()) {
            let _ = writeln!(out, "\n## {}\n", s.name);
            for f in &s.failures {
                let _ = writeln!(
                    out,
                    "- step {}: `{}` expected `{}`, got `{}`",
                    f.step, f.field, f.expected, f.actual
                );
            }
        }
        out
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, failures: Vec<ExpectationFailure>) -> ScenarioReport {
        ScenarioReport {
            name: name.to_owned(),
            steps: 3,
            ticks: 2,
            final_state: "normal".to_owned(),
            connected: 0b11111,
            shed_indicator: 0,
            latency: LatencySummary::default(),
            counters: CounterSummary::default(),
            failures,
        }
    }

    #[test]
    fn latency_summary_skips_unfilled_slots() {
        let mut stats = ShedStatistics::new();
        stats.record(Duration::from_micros(1500));
        stats.record(Duration::from_micros(500));
        let summary = LatencySummary::from(&stats);
        assert_eq!(summary.window_us, vec![1500, 500]);
        assert_eq!(summary.min_us, Some(500));
        assert_eq!(summary.average_us, 1000);
    }

    #[test]
    fn markdown_lists_failures() {
        let summary = ReplaySummary::new(
            "2026-01-01T00:00:00.000Z".to_owned(),
            vec![
                report("ok", Vec::new()),
                report(
                    "broken",
                    vec![ExpectationFailure {
                        step: 4,
                        field: "shed".to_owned(),
                        expected: "Some(1)".to_owned(),
                        actual: "None".to_owned(),
                    }],
                ),
            ],
        );
        assert!(!summary.all_passed());
        assert_eq!((summary.passed, summary.failed), (1, 1));
        let md = summary.to_markdown();
        assert!(md.contains("| ok | 2 | normal | 0 | 0 | PASS |"));
        assert!(md.contains("## broken"));
        assert!(md.contains("step 4: `shed`"));
        let json: serde_json::Value = serde_json::from_str(&summary.to_json()).unwrap();
        assert_eq!(json["total"], 2);
    }
}
