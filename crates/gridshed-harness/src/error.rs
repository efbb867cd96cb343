//! Harness error type.

use thiserror::Error;

use gridshed_core::error::ControlError;

use crate::scenario::ScenarioError;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error("no scenario files found in {0}")]
    NoScenarios(String),
}
