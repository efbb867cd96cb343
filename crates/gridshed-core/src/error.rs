//! Error types for the load-shedding controller.

use thiserror::Error;

/// Errors surfaced by controller construction and the worker runtime.
///
/// The control loop itself has no error path: every FSM state defines an
/// action for every input combination, and channel saturation is a silent
/// drop rather than an error.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The sensor reported a sample count of zero, which has no finite frequency.
    #[error("sensor reported a zero sample count")]
    ZeroSampleCount,
    /// A configuration field failed structural validation.
    #[error("invalid config `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },
    /// An optional input collaborator was not attached at startup.
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(&'static str),
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
    /// A worker thread panicked; observed when joining it.
    #[error("worker `{0}` panicked")]
    WorkerPanicked(&'static str),
}

pub type Result<T> = std::result::Result<T, ControlError>;
