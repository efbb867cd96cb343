//! Under-frequency load-shedding controller.
//!
//! Frequency samples from a sensor are folded into a circular history with
//! a rate-of-change per slot. Each sample refreshes a stability flag against
//! operator-adjustable thresholds. A polled finite state machine sheds loads
//! lowest priority first while the grid is unstable and reconnects them
//! highest first once it has settled, with a debounce window between
//! successive actions.
//!
//! # Architecture
//!
//! - **Sampling** (`sampling`): count conversion, ROC derivation, 100-slot history
//! - **Thresholds** (`thresholds`): operator-adjustable pair plus scancode bindings
//! - **Stability** (`stability`): verdict and instability onset timestamp
//! - **Shed statistics** (`shed_stats`): reaction latency window, min/max/average
//! - **Debounce** (`debounce`): single-shot deadline timer
//! - **Loads** (`loads`): connected/desired bitmaps and the switch policy
//! - **FSM** (`fsm`): the transition table and its side effects
//! - **Intake** (`intake`): non-blocking producer ports
//! - **Tasks / runtime** (`tasks`, `runtime`): worker bodies and threads
//! - **Telemetry** (`telemetry`): read-only snapshots and status text
//! - **Config / metrics** (`config`, `metrics`): env overrides, atomic counters

#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod context;
pub mod debounce;
pub mod error;
pub mod fsm;
pub mod intake;
pub mod loads;
pub mod metrics;
pub mod runtime;
pub mod sampling;
pub mod shed_stats;
pub mod stability;
pub mod state;
pub mod tasks;
pub mod telemetry;
pub mod thresholds;

pub use clock::{ManualClock, MonotonicClock, SystemClock};
pub use config::ControllerConfig;
pub use context::ControlContext;
pub use error::{ControlError, Result};
pub use fsm::{Action, LoadShedController, TickReport, transition};
pub use intake::{ButtonPort, KeyboardPort, PostOutcome, SensorPort};
pub use loads::{LoadBank, LoadOutputs};
pub use metrics::{ControlMetrics, MetricsSnapshot};
pub use runtime::{ControlSystem, OutputLatch, SwitchBank};
pub use sampling::{FrequencySample, SampleHistory};
pub use shed_stats::ShedStatistics;
pub use state::OperatingState;
pub use tasks::{KeyboardConsumer, LoadOutput, SampleProcessor, SwitchInput};
pub use telemetry::TelemetrySnapshot;
pub use thresholds::{ThresholdCommand, Thresholds};
