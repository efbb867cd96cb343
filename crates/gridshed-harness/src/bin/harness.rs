//! CLI entrypoint for the gridshed harness.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};

use gridshed_core::config::ControllerConfig;
use gridshed_harness::structured_log::{LogEmitter, now_utc, validate_log_file};
use gridshed_harness::{
    GridProfile, HarnessError, LiveOptions, ReplaySummary, Scenario, logger, replay, run_live,
};

/// Scenario replay and live runs for the load-shedding controller.
#[derive(Debug, Parser)]
#[command(name = "gridshed-harness")]
#[command(about = "Scenario replay and live runs for the gridshed controller")]
struct Cli {
    /// Run id used in structured log trace ids.
    #[arg(long, global = true, default_value = "run")]
    run_id: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay JSON scenarios deterministically.
    Replay {
        /// Scenario files or directories of `*.json` scenarios.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Structured JSONL log output (stdout if omitted).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Report output; `.md` gives markdown, anything else JSON.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Run the threaded controller against a synthetic grid.
    Live {
        /// Run length in milliseconds.
        #[arg(long, default_value_t = 6_000)]
        duration_ms: u64,
        /// Interval between sensor samples in milliseconds.
        #[arg(long, default_value_t = 20)]
        sample_ms: u64,
        /// Frequency lost during the disturbance.
        #[arg(long, default_value_t = 2.0)]
        dip_hz: f64,
        /// Disturbance start, in milliseconds from launch.
        #[arg(long, default_value_t = 500)]
        dip_start_ms: u64,
        /// Disturbance length in milliseconds.
        #[arg(long, default_value_t = 3_000)]
        dip_len_ms: u64,
        /// Frequency recovered per shed load.
        #[arg(long, default_value_t = 0.6)]
        relief_hz: f64,
        /// Override the initial frequency threshold.
        #[arg(long)]
        freq_threshold: Option<f64>,
        /// Override the initial ROC threshold.
        #[arg(long)]
        roc_threshold: Option<f64>,
        /// Override the debounce period in milliseconds.
        #[arg(long)]
        debounce_ms: Option<u64>,
        /// Override the number of loads.
        #[arg(long)]
        loads: Option<usize>,
        /// Structured JSONL log output (stdout if omitted).
        #[arg(long)]
        log: Option<PathBuf>,
        /// JSON report output (stdout if omitted).
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Validate a structured JSONL log file.
    ValidateLog {
        /// Path to the JSONL log.
        log: PathBuf,
    },
}

fn open_log(path: Option<&Path>, run_id: &str) -> std::io::Result<LogEmitter> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            LogEmitter::to_file(path, run_id, "-")
        }
        None => Ok(LogEmitter::to_stdout(run_id, "-")),
    }
}

fn collect_scenarios(paths: &[PathBuf]) -> Result<Vec<PathBuf>, HarnessError> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
                .collect();
            if found.is_empty() {
                return Err(HarnessError::NoScenarios(path.display().to_string()));
            }
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn write_output(path: Option<&Path>, body: &str) -> std::io::Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, body)?;
            eprintln!("Wrote {}", path.display());
            Ok(())
        }
        None => {
            println!("{body}");
            Ok(())
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if let Err(err) = logger::install(&cli.run_id) {
        eprintln!("structured logger unavailable: {err}");
    }

    match cli.command {
        Command::Replay {
            paths,
            log,
            report,
        } => {
            let files = collect_scenarios(&paths)?;
            let mut emitter = open_log(log.as_deref(), &cli.run_id)?;
            let mut reports = Vec::with_capacity(files.len());
            for file in &files {
                let scenario = Scenario::from_file(file)?;
                eprintln!("Replaying {} ({})", scenario.name, file.display());
                let result = replay(&scenario, &mut emitter)?;
                if !result.passed() {
                    eprintln!("  FAIL: {} expectation(s) not met", result.failures.len());
                }
                reports.push(result);
            }
            let summary = ReplaySummary::new(now_utc(), reports);
            let body = match report.as_deref() {
                Some(p) if p.extension().and_then(|s| s.to_str()) == Some("md") => {
                    summary.to_markdown()
                }
                _ => summary.to_json(),
            };
            if report.is_some() || log.is_some() {
                write_output(report.as_deref(), &body)?;
            }
            eprintln!(
                "{} scenario(s): {} passed, {} failed",
                summary.total, summary.passed, summary.failed
            );
            if !summary.all_passed() {
                return Err(format!("{} scenario(s) failed", summary.failed).into());
            }
        }
        Command::Live {
            duration_ms,
            sample_ms,
            dip_hz,
            dip_start_ms,
            dip_len_ms,
            relief_hz,
            freq_threshold,
            roc_threshold,
            debounce_ms,
            loads,
            log,
            report,
        } => {
            let mut config = ControllerConfig::from_env();
            if let Some(v) = freq_threshold {
                config.freq_threshold_hz = v;
            }
            if let Some(v) = roc_threshold {
                config.roc_threshold_hz_per_s = v;
            }
            if let Some(v) = debounce_ms {
                config.debounce_period = Duration::from_millis(v);
            }
            if let Some(v) = loads {
                config.load_count = v;
            }
            let options = LiveOptions {
                duration: Duration::from_millis(duration_ms),
                sample_period: Duration::from_millis(sample_ms.max(1)),
                profile: GridProfile {
                    dip_hz,
                    dip_start: Duration::from_millis(dip_start_ms),
                    dip_len: Duration::from_millis(dip_len_ms),
                    relief_per_load_hz: relief_hz,
                    ..GridProfile::default()
                },
            };
            eprintln!(
                "Live run: {duration_ms} ms, {} loads, dip {dip_hz} Hz",
                config.load_count
            );
            let mut emitter = open_log(log.as_deref(), &cli.run_id)?;
            let result = run_live(config, &options, &mut emitter)?;
            for line in &result.status_lines {
                eprintln!("  {line}");
            }
            let body = serde_json::to_string_pretty(&result)?;
            if report.is_some() || log.is_some() {
                write_output(report.as_deref(), &body)?;
            }
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            if errors.is_empty() {
                eprintln!("{}: {lines} line(s), valid", log.display());
            } else {
                for err in &errors {
                    eprintln!("{err}");
                }
                return Err(format!(
                    "{}: {} error(s) in {lines} line(s)",
                    log.display(),
                    errors.len()
                )
                .into());
            }
        }
    }

    Ok(())
}
