//! `log` facade backend that renders records as JSONL [`LogEntry`] lines.
//!
//! Level comes from `GRIDSHED_LOG` (`error|warn|info|debug|trace`), default
//! `info`; unparseable values fall back to the default.

use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::structured_log::{LogEmitter, LogEntry, LogLevel};

pub const LOG_ENV: &str = "GRIDSHED_LOG";

static LOGGER: OnceLock<JsonLogger> = OnceLock::new();

pub struct JsonLogger {
    level: log::LevelFilter,
    emitter: Mutex<LogEmitter>,
}

impl JsonLogger {
    #[must_use]
    pub fn new(emitter: LogEmitter, level: log::LevelFilter) -> Self {
        Self {
            level,
            emitter: Mutex::new(emitter),
        }
    }
}

impl log::Log for JsonLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = LogEntry::new(String::new(), record.level().into(), "log").with_details(
            serde_json::json!({
                "target": record.target(),
                "message": record.args().to_string(),
            }),
        );
        // a logger has nowhere to report its own write failures
        let _ = self.emitter.lock().emit_entry(entry);
    }

    fn flush(&self) {
        let _ = self.emitter.lock().flush();
    }
}

/// Level filter from a raw `GRIDSHED_LOG` value.
#[must_use]
pub fn level_from(raw: Option<&str>) -> log::LevelFilter {
    match raw.and_then(LogLevel::from_str_loose) {
        Some(LogLevel::Error) => log::LevelFilter::Error,
        Some(LogLevel::Warn) => log::LevelFilter::Warn,
        Some(LogLevel::Debug) => log::LevelFilter::Debug,
        Some(LogLevel::Trace) => log::LevelFilter::Trace,
        Some(LogLevel::Info) | None => log::LevelFilter::Info,
    }
}

/// Install the JSONL logger on stderr for `run_id`.
///
/// Only the first call in a process takes effect.
pub fn install(run_id: &str) -> Result<(), log::SetLoggerError> {
    let level = level_from(std::env::var(LOG_ENV).ok().as_deref());
    let logger = LOGGER.get_or_init(|| {
        JsonLogger::new(
            LogEmitter::to_writer(std::io::stderr(), run_id, "core"),
            level,
        )
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}
