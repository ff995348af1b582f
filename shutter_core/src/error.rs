use thiserror::Error;

use crate::position::PositionError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ShutterError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("busy: {0} in progress")]
    Busy(&'static str),
    #[error("invalid position: {0}")]
    InvalidPosition(#[from] PositionError),
    #[error("aborted: {0}")]
    Abort(AbortReason),
}

/// Why an active operation was cut short. The actuator is always halted
/// before one of these is reported.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("max run time exceeded")]
    MaxRuntime,
    #[error("no end of travel before the seek timeout")]
    StallTimeout,
    #[error("calibration endpoints too close together")]
    DegenerateCalibration,
    #[error("no distance sample available")]
    NoSignal,
}

impl AbortReason {
    /// Stable identifier used in logs and JSON output.
    pub fn name(&self) -> &'static str {
        match self {
            AbortReason::MaxRuntime => "MaxRuntime",
            AbortReason::StallTimeout => "StallTimeout",
            AbortReason::DegenerateCalibration => "DegenerateCalibration",
            AbortReason::NoSignal => "NoSignal",
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing actuator")]
    MissingActuator,
    #[error("missing distance sensor")]
    MissingSensor,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

/// Recover the typed error behind a report, falling back to its message.
pub fn shutter_error_of(report: &eyre::Report) -> ShutterError {
    if let Some(e) = report.downcast_ref::<ShutterError>() {
        return e.clone();
    }
    if let Some(e) = report.downcast_ref::<PositionError>() {
        return ShutterError::InvalidPosition(*e);
    }
    ShutterError::Hardware(format!("{report:#}"))
}
