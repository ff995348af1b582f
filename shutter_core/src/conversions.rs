//! `From` implementations bridging `shutter_config` types to `shutter_core` types.

use crate::config::{CalibrationCfg, MotionCfg, RangingCfg};
use crate::position::{CalibrationEndpoints, PositionConvention};

impl From<shutter_config::Convention> for PositionConvention {
    fn from(c: shutter_config::Convention) -> Self {
        match c {
            shutter_config::Convention::ClosedIsFull => PositionConvention::ClosedIsFull,
            shutter_config::Convention::OpenIsFull => PositionConvention::OpenIsFull,
        }
    }
}

impl From<&shutter_config::MotionCfg> for MotionCfg {
    fn from(c: &shutter_config::MotionCfg) -> Self {
        Self {
            tick_ms: c.tick_ms,
            tolerance_100ths: c.tolerance_100ths,
            max_move_ms: c.max_move_ms,
            convention: c.convention.into(),
        }
    }
}

impl From<&shutter_config::RangingCfg> for RangingCfg {
    fn from(c: &shutter_config::RangingCfg) -> Self {
        Self {
            echo_timeout_ms: c.echo_timeout_ms,
        }
    }
}

impl From<&shutter_config::CalibrationCfg> for CalibrationCfg {
    fn from(c: &shutter_config::CalibrationCfg) -> Self {
        Self {
            stall_delta_cm: c.stall_delta_cm,
            stall_ticks: c.stall_ticks,
            settle_samples: c.settle_samples,
            max_seek_ms: c.max_seek_ms,
            default_endpoints: CalibrationEndpoints::new(c.default_open_cm, c.default_closed_cm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_defaults_match_runtime_defaults() {
        let cfg = shutter_config::load_toml(
            "[pins]\nopen_drive = 1\nclose_drive = 2\ntrigger = 3\necho = 4\n",
        )
        .unwrap();
        let motion = MotionCfg::from(&cfg.motion);
        let cal = CalibrationCfg::from(&cfg.calibration);
        let def = CalibrationCfg::default();
        assert_eq!(motion.tick_ms, MotionCfg::default().tick_ms);
        assert_eq!(motion.tolerance_100ths, 500);
        assert_eq!(motion.convention, PositionConvention::ClosedIsFull);
        assert_eq!(cal.stall_ticks, def.stall_ticks);
        assert_eq!(cal.default_endpoints, def.default_endpoints);
        assert_eq!(RangingCfg::from(&cfg.ranging).echo_timeout_ms, 60);
    }
}
