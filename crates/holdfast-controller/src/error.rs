//! Controller error types.

use holdfast_hardware::HardwareError;
use thiserror::Error;

/// Errors that stop the controller from starting or running.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Configuration error: {0}")]
    Config(#[from] holdfast_core::Error),

    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    #[error("No parts left to monitor")]
    NoParts,

    #[error("Part '{part}' was given {given} actuators but configures {configured}")]
    ActuatorMismatch {
        part: String,
        given: usize,
        configured: usize,
    },
}

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;
