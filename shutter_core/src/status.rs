//! Results of driving the control loop.

use crate::error::ShutterError;
use crate::position::CalibrationEndpoints;

/// Public status of a single step of the control loop.
#[derive(Debug)]
pub enum MotionStatus {
    /// Keep stepping.
    Running,
    /// Operation finished; the actuator is already halted.
    Complete(Outcome),
    /// Aborted with a typed error; the actuator has been halted.
    Aborted(ShutterError),
}

/// How a command resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    TargetReached {
        position: u16,
    },
    /// Untargeted movement ran until the readings stopped changing.
    EndOfTravel {
        position: Option<u16>,
    },
    Stopped,
    Calibrated {
        endpoints: CalibrationEndpoints,
        persisted: bool,
    },
}

impl Outcome {
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::TargetReached { .. } => "TargetReached",
            Outcome::EndOfTravel { .. } => "EndOfTravel",
            Outcome::Stopped => "Stopped",
            Outcome::Calibrated { .. } => "Calibrated",
        }
    }
}

/// Which kind of operation holds the motion slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Movement,
    Calibration,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Movement => "movement",
            OperationKind::Calibration => "calibration",
        }
    }
}
