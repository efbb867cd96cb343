//! Test and run harness for the gridshed controller.
//!
//! This crate provides:
//! - Scenario replay: deterministic JSON scenarios against a manual clock
//! - Live runs: the threaded controller against a synthetic grid
//! - Structured logging: JSONL records, a `log` backend, schema validation
//! - Reports: per-scenario and aggregate summaries in JSON and markdown

#![forbid(unsafe_code)]

pub mod error;
pub mod live;
pub mod logger;
pub mod report;
pub mod scenario;
pub mod structured_log;

pub use error::HarnessError;
pub use live::{GridProfile, LiveOptions, run_live};
pub use report::{LiveReport, ReplaySummary, ScenarioReport};
pub use scenario::{Scenario, ScenarioError, replay};
