//! Deterministic scenario replay.
//!
//! A scenario is a JSON list of timed steps. Replay runs every task body on
//! the calling thread against a [`ManualClock`]: each step first moves the
//! clock to its `at_ms`, then performs its operation. Posted samples and
//! scancodes go through the real intake ports and are drained immediately,
//! mirroring the sample task's top priority.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gridshed_core::clock::ManualClock;
use gridshed_core::config::ControllerConfig;
use gridshed_core::context::ControlContext;
use gridshed_core::error::ControlError;
use gridshed_core::fsm::{LoadShedController, TickReport};
use gridshed_core::intake::{ButtonPort, KeyboardPort, SensorPort, key_channel, sample_channel};
use gridshed_core::loads::LoadBank;
use gridshed_core::sampling::FrequencySample;
use gridshed_core::state::OperatingState;
use gridshed_core::tasks::{KeyboardConsumer, SampleProcessor};

use crate::report::{ExpectationFailure, ScenarioReport};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed scenario: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error("step {step}: at_ms {at_ms} is earlier than the previous step ({previous_ms})")]
    TimeWentBackwards { step: usize, at_ms: u64, previous_ms: u64 },
    #[error("step {step}: unknown state '{value}'")]
    UnknownState { step: usize, value: String },
}

/// Overrides applied on top of [`ControllerConfig::default`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    pub freq_threshold_hz: Option<f64>,
    pub roc_threshold_hz_per_s: Option<f64>,
    pub debounce_ms: Option<u64>,
    pub load_count: Option<usize>,
    pub sample_queue_capacity: Option<usize>,
    pub key_queue_capacity: Option<usize>,
}

impl ScenarioConfig {
    #[must_use]
    pub fn resolve(&self) -> ControllerConfig {
        let mut cfg = ControllerConfig::default();
        if let Some(v) = self.freq_threshold_hz {
            cfg.freq_threshold_hz = v;
        }
        if let Some(v) = self.roc_threshold_hz_per_s {
            cfg.roc_threshold_hz_per_s = v;
        }
        if let Some(v) = self.debounce_ms {
            cfg.debounce_period = Duration::from_millis(v);
        }
        if let Some(v) = self.load_count {
            cfg.load_count = v;
        }
        if let Some(v) = self.sample_queue_capacity {
            cfg.sample_queue_capacity = v;
        }
        if let Some(v) = self.key_queue_capacity {
            cfg.key_queue_capacity = v;
        }
        cfg
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StepOp {
    /// Post a frequency in Hz.
    Sample { hz: f64 },
    /// Post a raw sensor count.
    Count { count: u32 },
    /// Post a keyboard scancode.
    Key { code: u8 },
    /// One maintenance button edge.
    Button,
    /// Change the switch bitmap read by subsequent ticks.
    Switches { bits: u32 },
    /// Run FSM iterations.
    Tick {
        #[serde(default = "one")]
        count: u32,
    },
    /// Only move the clock.
    Wait,
}

const fn one() -> u32 {
    1
}

/// Checks made after a step. Unset fields are not checked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Expectation {
    pub state: Option<String>,
    pub action: Option<String>,
    pub shed: Option<usize>,
    pub reconnected: Option<usize>,
    pub connected: Option<u32>,
    pub shed_indicator: Option<u32>,
    pub stable: Option<bool>,
    pub freq_threshold_hz: Option<f64>,
    pub roc_threshold_hz_per_s: Option<f64>,
    pub shed_events: Option<u64>,
    pub last_latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub at_ms: u64,
    #[serde(flatten)]
    pub op: StepOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<Expectation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: ScenarioConfig,
    /// Start with every load connected and desired.
    #[serde(default = "yes")]
    pub all_connected: bool,
    /// Initial switch bitmap; defaults to every load on.
    pub switches: Option<u32>,
    pub steps: Vec<Step>,
}

const fn yes() -> bool {
    true
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

/// Everything a replay needs, wired the same way the threaded runtime is.
struct Rig {
    clock: Arc<ManualClock>,
    ctx: Arc<ControlContext>,
    sensor: SensorPort,
    samples: Receiver<FrequencySample>,
    keyboard: KeyboardPort,
    keys: Receiver<u8>,
    button: ButtonPort,
    processor: SampleProcessor,
    consumer: KeyboardConsumer,
    controller: LoadShedController,
    switches: u32,
}

impl Rig {
    fn new(scenario: &Scenario) -> Result<Self, ScenarioError> {
        let config = scenario.config.resolve();
        config.validate()?;
        let clock = Arc::new(ManualClock::new());
        let ctx = Arc::new(ControlContext::new(&config, clock.clone()));
        let (sensor, samples) = sample_channel(&ctx, config.sample_queue_capacity);
        let (keyboard, keys) = key_channel(&ctx, config.key_queue_capacity);
        let loads = if scenario.all_connected {
            LoadBank::all_connected(config.load_count)
        } else {
            LoadBank::new(config.load_count)
        };
        let switches = scenario
            .switches
            .unwrap_or_else(|| LoadBank::all_connected(config.load_count).desired_bits());
        Ok(Self {
            button: ButtonPort::new(Arc::clone(&ctx)),
            processor: SampleProcessor::new(Arc::clone(&ctx)),
            consumer: KeyboardConsumer::new(Arc::clone(&ctx)),
            controller: LoadShedController::with_loads(Arc::clone(&ctx), &config, loads),
            clock,
            ctx,
            sensor,
            samples,
            keyboard,
            keys,
            switches,
        })
    }

    fn drain(&self) {
        for sample in self.samples.try_iter() {
            self.processor.process(sample);
        }
        for code in self.keys.try_iter() {
            self.consumer.handle(code);
        }
    }
}

/// Replay `scenario`, logging through `log`.
pub fn replay(scenario: &Scenario, log: &mut LogEmitter) -> Result<ScenarioReport, ScenarioError> {
    let mut rig = Rig::new(scenario)?;
    log.set_scenario(&scenario.name);
    log.emit_entry(
        LogEntry::new(String::new(), LogLevel::Info, "scenario_start")
            .with_details(serde_json::json!({ "steps": scenario.steps.len() })),
    )?;

    let mut failures = Vec::new();
    let mut ticks = 0u64;
    let mut previous_ms = 0u64;

    for (index, step) in scenario.steps.iter().enumerate() {
        if step.at_ms < previous_ms {
            return Err(ScenarioError::TimeWentBackwards {
                step: index,
                at_ms: step.at_ms,
                previous_ms,
            });
        }
        previous_ms = step.at_ms;
        rig.clock.set(Duration::from_millis(step.at_ms));

        let mut last_tick = None;
        match step.op {
            StepOp::Sample { hz } => {
                rig.sensor.post(FrequencySample::from_hz(hz));
            }
            StepOp::Count { count } => {
                rig.sensor.post_count(count);
            }
            StepOp::Key { code } => {
                rig.keyboard.post_scancode(code);
            }
            StepOp::Button => {
                let engaged = rig.button.press();
                log.emit_entry(
                    LogEntry::new(String::new(), LogLevel::Info, "maintenance_request")
                        .with_at(rig.ctx.now())
                        .with_details(serde_json::json!({ "engaged": engaged })),
                )?;
            }
            StepOp::Switches { bits } => rig.switches = bits,
            StepOp::Tick { count } => {
                for _ in 0..count {
                    let report = rig.controller.tick(rig.switches);
                    ticks += 1;
                    log_tick(log, &report)?;
                    last_tick = Some(report);
                }
            }
            StepOp::Wait => {}
        }
        rig.drain();

        if let Some(expect) = &step.expect {
            let found = check(index, expect, &rig, last_tick.as_ref())?;
            let outcome = if found.is_empty() {
                Outcome::Pass
            } else {
                Outcome::Fail
            };
            let level = if found.is_empty() {
                LogLevel::Info
            } else {
                LogLevel::Error
            };
            let mut entry = LogEntry::new(String::new(), level, "expectation")
                .with_at(rig.ctx.now())
                .with_state(rig.controller.state())
                .with_stable(rig.ctx.stability.is_stable())
                .with_outcome(outcome);
            if !found.is_empty() {
                entry = entry.with_details(serde_json::to_value(&found)?);
            }
            log.emit_entry(entry)?;
            failures.extend(found);
        }
    }

    let report = ScenarioReport::build(
        &scenario.name,
        scenario.steps.len(),
        ticks,
        failures,
        &rig.controller,
    );
    log.emit_entry(
        LogEntry::new(String::new(), LogLevel::Info, "scenario_end")
            .with_state(rig.controller.state())
            .with_outcome(if report.passed() {
                Outcome::Pass
            } else {
                Outcome::Fail
            }),
    )?;
    log.flush()?;
    Ok(report)
}

fn log_tick(log: &mut LogEmitter, report: &TickReport) -> std::io::Result<()> {
    if report.changed_state() || report.shed.is_some() || report.reconnected.is_some() {
        log.emit_entry(LogEntry::from_tick(report))?;
    }
    Ok(())
}

fn check(
    step: usize,
    expect: &Expectation,
    rig: &Rig,
    tick: Option<&TickReport>,
) -> Result<Vec<ExpectationFailure>, ScenarioError> {
    let mut failures = Vec::new();
    let mut compare = |field: &str, expected: String, actual: String| {
        if expected != actual {
            failures.push(ExpectationFailure {
                step,
                field: field.to_owned(),
                expected,
                actual,
            });
        }
    };

    if let Some(raw) = &expect.state {
        let expected =
            OperatingState::from_str_loose(raw).ok_or_else(|| ScenarioError::UnknownState {
                step,
                value: raw.clone(),
            })?;
        compare(
            "state",
            expected.as_str().to_owned(),
            rig.controller.state().as_str().to_owned(),
        );
    }
    if let Some(action) = &expect.action {
        let actual = tick.map_or("none", |t| t.action.as_str());
        compare("action", action.clone(), actual.to_owned());
    }
    if expect.shed.is_some() {
        compare(
            "shed",
            format!("{:?}", expect.shed),
            format!("{:?}", tick.and_then(|t| t.shed)),
        );
    }
    if expect.reconnected.is_some() {
        compare(
            "reconnected",
            format!("{:?}", expect.reconnected),
            format!("{:?}", tick.and_then(|t| t.reconnected)),
        );
    }
    let outputs = rig.controller.loads().outputs();
    if let Some(bits) = expect.connected {
        compare(
            "connected",
            format!("{bits:#b}"),
            format!("{:#b}", outputs.connected),
        );
    }
    if let Some(bits) = expect.shed_indicator {
        compare(
            "shed_indicator",
            format!("{bits:#b}"),
            format!("{:#b}", outputs.shed_indicator),
        );
    }
    if let Some(stable) = expect.stable {
        compare(
            "stable",
            stable.to_string(),
            rig.ctx.stability.is_stable().to_string(),
        );
    }
    let thresholds = rig.ctx.thresholds.read();
    if let Some(hz) = expect.freq_threshold_hz {
        compare(
            "freq_threshold_hz",
            format!("{hz:.2}"),
            format!("{:.2}", thresholds.freq_hz),
        );
    }
    if let Some(roc) = expect.roc_threshold_hz_per_s {
        compare(
            "roc_threshold_hz_per_s",
            format!("{roc:.2}"),
            format!("{:.2}", thresholds.roc_hz_per_s),
        );
    }
    let stats = rig.ctx.stats.snapshot();
    if let Some(events) = expect.shed_events {
        compare(
            "shed_events",
            events.to_string(),
            stats.event_count.to_string(),
        );
    }
    if let Some(ms) = expect.last_latency_ms {
        compare(
            "last_latency_ms",
            ms.to_string(),
            stats
                .last
                .map_or_else(|| "none".to_owned(), |d| d.as_millis().to_string()),
        );
    }
    Ok(failures)
}
