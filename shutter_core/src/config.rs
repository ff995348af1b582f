//! Configuration types for the motion core.
//!
//! These are the runtime structs used by `ShutterCore`. They are separate
//! from the TOML-deserialized config in `shutter_config`.

use crate::position::{CalibrationEndpoints, PositionConvention};

/// Movement control loop.
#[derive(Debug, Clone)]
pub struct MotionCfg {
    /// Control-loop period (ms).
    pub tick_ms: u64,
    /// Target reached once `|target - position| < tolerance_100ths`. Default: 500 (5%).
    pub tolerance_100ths: u16,
    /// Hard cap on a single movement (ms).
    pub max_move_ms: u64,
    pub convention: PositionConvention,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            tolerance_100ths: 500,
            max_move_ms: 60_000,
            convention: PositionConvention::ClosedIsFull,
        }
    }
}

/// Ranging sensor access.
#[derive(Debug, Clone)]
pub struct RangingCfg {
    /// Max wait for one echo (ms). Missing echoes are "no sample", not errors.
    pub echo_timeout_ms: u64,
}

impl Default for RangingCfg {
    fn default() -> Self {
        Self {
            echo_timeout_ms: 60,
        }
    }
}

/// Stall detection and the calibration sequence.
#[derive(Debug, Clone)]
pub struct CalibrationCfg {
    /// Consecutive readings closer than this count as "not moving" (cm).
    pub stall_delta_cm: f32,
    /// End of travel once the stable counter exceeds this.
    pub stall_ticks: u32,
    /// Samples averaged into a stable measurement.
    pub settle_samples: u32,
    /// Hard cap on each seek phase (ms).
    pub max_seek_ms: u64,
    /// Endpoints used until a calibration is stored.
    pub default_endpoints: CalibrationEndpoints,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            stall_delta_cm: 2.0,
            stall_ticks: 20,
            settle_samples: 5,
            max_seek_ms: 120_000,
            default_endpoints: CalibrationEndpoints::default(),
        }
    }
}
