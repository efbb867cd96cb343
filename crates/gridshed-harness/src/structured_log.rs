//! Structured JSONL logging for controller runs.
//!
//! Provides:
//! - [`LogEntry`]: one JSONL record with required + optional fields.
//! - [`LogEmitter`]: writes records to a file, stdout or a shared buffer.
//! - [`validate_log_line`] / [`validate_log_file`]: schema checks.
//!
//! Trace ids follow `<run>::<scenario>::<seq>`.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use gridshed_core::fsm::{Action, TickReport};
use gridshed_core::state::OperatingState;

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const NAMES: [&'static str; 5] = ["trace", "debug", "info", "warn", "error"];

    /// Loose parse of a level name; unknown values give `None`.
    #[must_use]
    pub fn from_str_loose(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

/// Expectation check outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
    Error,
}

const ACTION_NAMES: [&str; 5] = ["idle", "shed_first", "shed_next", "reconnect", "rearm"];

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    /// Controller time of the event, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_ms: Option<u64>,
    /// `OperatingState::as_str` vocabulary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// `Action::as_str` vocabulary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Index of the load shed or reconnected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_us: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freq_hz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            scenario: None,
            at_ms: None,
            state: None,
            action: None,
            load: None,
            latency_us: None,
            stable: None,
            freq_hz: None,
            outcome: None,
            details: None,
        }
    }

    /// Entry describing one controller tick that did something.
    #[must_use]
    pub fn from_tick(report: &TickReport) -> Self {
        let event = if report.changed_state() {
            "state_change"
        } else {
            "fsm_action"
        };
        let mut entry = Self::new(String::new(), LogLevel::Info, event)
            .with_at(report.at)
            .with_state(report.state)
            .with_action(report.action);
        if let Some(load) = report.shed.or(report.reconnected) {
            entry = entry.with_load(load);
        }
        if let Some(latency) = report.latency {
            entry = entry.with_latency(latency);
        }
        entry
    }

    #[must_use]
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    #[must_use]
    pub fn with_at(mut self, at: std::time::Duration) -> Self {
        self.at_ms = Some(u64::try_from(at.as_millis()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: OperatingState) -> Self {
        self.state = Some(state.as_str().to_owned());
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action.as_str().to_owned());
        self
    }

    #[must_use]
    pub fn with_load(mut self, load: usize) -> Self {
        self.load = Some(load);
        self
    }

    #[must_use]
    pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
        self.latency_us = Some(u64::try_from(latency.as_micros()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub fn with_stable(mut self, stable: bool) -> Self {
        self.stable = Some(stable);
        self
    }

    #[must_use]
    pub fn with_freq(mut self, hz: f64) -> Self {
        self.freq_hz = Some(hz);
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// In-memory sink that can be read back while an emitter still owns a clone.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writes structured JSONL log entries.
pub struct LogEmitter {
    writer: Box<dyn Write + Send>,
    seq: u64,
    run_id: String,
    scenario: String,
    min_level: LogLevel,
}

impl LogEmitter {
    pub fn to_file(path: &Path, run_id: &str, scenario: &str) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::to_writer(
            std::io::BufWriter::new(file),
            run_id,
            scenario,
        ))
    }

    #[must_use]
    pub fn to_stdout(run_id: &str, scenario: &str) -> Self {
        Self::to_writer(std::io::stdout(), run_id, scenario)
    }

    /// Emitter plus a handle for reading back what it wrote.
    #[must_use]
    pub fn to_buffer(run_id: &str, scenario: &str) -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::new();
        (Self::to_writer(buffer.clone(), run_id, scenario), buffer)
    }

    #[must_use]
    pub fn to_writer(writer: impl Write + Send + 'static, run_id: &str, scenario: &str) -> Self {
        Self {
            writer: Box::new(writer),
            seq: 0,
            run_id: run_id.to_owned(),
            scenario: scenario.to_owned(),
            min_level: LogLevel::Trace,
        }
    }

    /// Drop entries below `level`.
    #[must_use]
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Switch the scenario segment of subsequent trace ids.
    pub fn set_scenario(&mut self, scenario: &str) {
        self.scenario = scenario.to_owned();
    }

    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("{}::{}::{:04}", self.run_id, self.scenario, self.seq)
    }

    /// Emit a bare entry with an auto-generated trace id.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let entry = LogEntry::new(String::new(), level, event);
        self.emit_entry(entry)
    }

    /// Emit a populated entry, filling in the trace id and scenario when unset.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<LogEntry> {
        if entry.level < self.min_level {
            return Ok(entry);
        }
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        if entry.scenario.is_none() {
            entry.scenario = Some(self.scenario.clone());
        }
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")?;
        Ok(entry)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl std::fmt::Debug for LogEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEmitter")
            .field("seq", &self.seq)
            .field("run_id", &self.run_id)
            .field("scenario", &self.scenario)
            .finish_non_exhaustive()
    }
}

/// Validation error for a log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

fn check_vocab(
    obj: &serde_json::Map<String, serde_json::Value>,
    field: &str,
    allowed: &[&str],
    line_number: usize,
    errors: &mut Vec<LogValidationError>,
) {
    if let Some(value) = obj.get(field).and_then(|v| v.as_str())
        && !allowed.contains(&value)
    {
        errors.push(LogValidationError {
            line_number,
            field: field.to_owned(),
            message: format!("invalid {field}: '{value}'"),
        });
    }
}

/// Validate one JSONL line.
pub fn validate_log_line(
    line: &str,
    line_number: usize,
) -> Result<LogEntry, Vec<LogValidationError>> {
    let mut errors = Vec::new();

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return Err(vec![LogValidationError {
                line_number,
                field: "<json>".to_owned(),
                message: format!("invalid JSON: {e}"),
            }]);
        }
    };
    let Some(obj) = value.as_object() else {
        return Err(vec![LogValidationError {
            line_number,
            field: "<root>".to_owned(),
            message: "expected JSON object".to_owned(),
        }]);
    };

    for field in ["timestamp", "trace_id", "level", "event"] {
        if !obj.contains_key(field) {
            errors.push(LogValidationError {
                line_number,
                field: field.to_owned(),
                message: "required field missing".to_owned(),
            });
        }
    }

    check_vocab(obj, "level", &LogLevel::NAMES, line_number, &mut errors);
    let states = OperatingState::ALL.map(OperatingState::as_str);
    check_vocab(obj, "state", &states, line_number, &mut errors);
    check_vocab(obj, "action", &ACTION_NAMES, line_number, &mut errors);
    check_vocab(
        obj,
        "outcome",
        &["pass", "fail", "skip", "error"],
        line_number,
        &mut errors,
    );

    if let Some(trace_id) = obj.get("trace_id").and_then(|v| v.as_str())
        && trace_id.split("::").count() != 3
    {
        errors.push(LogValidationError {
            line_number,
            field: "trace_id".to_owned(),
            message: format!("expected <run>::<scenario>::<seq>, got '{trace_id}'"),
        });
    }

    // fsm_action entries exist only because a load moved
    if obj.get("event").and_then(|v| v.as_str()) == Some("fsm_action")
        && let Some(action) = obj.get("action").and_then(|v| v.as_str())
        && matches!(action, "shed_first" | "shed_next" | "reconnect")
        && !obj.get("load").is_some_and(serde_json::Value::is_u64)
    {
        errors.push(LogValidationError {
            line_number,
            field: "load".to_owned(),
            message: format!("'{action}' entries must carry a load index"),
        });
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value::<LogEntry>(value).map_err(|e| {
        vec![LogValidationError {
            line_number,
            field: "<deserialization>".to_owned(),
            message: format!("failed to deserialize: {e}"),
        }]
    })
}

/// Validate a whole JSONL file. Returns the non-empty line count and all errors.
pub fn validate_log_file(path: &Path) -> std::io::Result<(usize, Vec<LogValidationError>)> {
    let content = std::fs::read_to_string(path)?;
    let mut all_errors = Vec::new();
    let mut line_count = 0;

    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        line_count += 1;
        if let Err(errs) = validate_log_line(line, i + 1) {
            all_errors.extend(errs);
        }
    }
    Ok((line_count, all_errors))
}

/// RFC 3339 UTC timestamp with millisecond precision.
#[must_use]
pub fn now_utc() -> String {
    let since_epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(since_epoch.as_secs(), since_epoch.subsec_millis())
}

fn format_utc(secs: u64, millis: u32) -> String {
    let days = i64::try_from(secs / 86_400).unwrap_or(i64::MAX);
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60,
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    (
        year,
        u32::try_from(month).unwrap_or(1),
        u32::try_from(day).unwrap_or(1),
    )
}
