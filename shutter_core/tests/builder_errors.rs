use rstest::rstest;
use shutter_core::mocks::{RecordingActuator, ScriptedSensor};
use shutter_core::{BuildError, CalibrationCfg, MotionCfg, RangingCfg, Shutter};

#[rstest]
fn builder_missing_actuator_yields_typed_build_error() {
    let err = Shutter::builder()
        .with_sensor(ScriptedSensor::from_samples([50.0]))
        .try_build()
        .expect_err("should fail with MissingActuator");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingActuator) => {}
        other => panic!("expected MissingActuator, got: {other:?}"),
    }
}

#[rstest]
fn builder_missing_sensor_yields_typed_build_error() {
    let err = Shutter::builder()
        .with_actuator(RecordingActuator::new())
        .try_build()
        .expect_err("should fail with MissingSensor");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingSensor) => {}
        other => panic!("expected MissingSensor, got: {other:?}"),
    }
}

fn built_with(
    motion: MotionCfg,
    ranging: RangingCfg,
    calibration: CalibrationCfg,
) -> eyre::Result<Shutter> {
    Shutter::builder()
        .with_actuator(RecordingActuator::new())
        .with_sensor(ScriptedSensor::from_samples([50.0]))
        .with_motion(motion)
        .with_ranging(ranging)
        .with_calibration_cfg(calibration)
        .build()
}

#[rstest]
#[case::zero_tick(MotionCfg { tick_ms: 0, ..MotionCfg::default() }, RangingCfg::default(), CalibrationCfg::default(), "tick_ms")]
#[case::zero_tolerance(MotionCfg { tolerance_100ths: 0, ..MotionCfg::default() }, RangingCfg::default(), CalibrationCfg::default(), "tolerance_100ths")]
#[case::short_cap(MotionCfg { max_move_ms: 50, ..MotionCfg::default() }, RangingCfg::default(), CalibrationCfg::default(), "max_move_ms")]
#[case::zero_echo_timeout(MotionCfg::default(), RangingCfg { echo_timeout_ms: 0 }, CalibrationCfg::default(), "echo_timeout_ms")]
#[case::nan_delta(MotionCfg::default(), RangingCfg::default(), CalibrationCfg { stall_delta_cm: f32::NAN, ..CalibrationCfg::default() }, "stall_delta_cm")]
#[case::zero_stall_ticks(MotionCfg::default(), RangingCfg::default(), CalibrationCfg { stall_ticks: 0, ..CalibrationCfg::default() }, "stall_ticks")]
#[case::zero_settle(MotionCfg::default(), RangingCfg::default(), CalibrationCfg { settle_samples: 0, ..CalibrationCfg::default() }, "settle_samples")]
#[case::short_seek(MotionCfg::default(), RangingCfg::default(), CalibrationCfg { max_seek_ms: 10, ..CalibrationCfg::default() }, "max_seek_ms")]
fn builder_rejects_invalid_config(
    #[case] motion: MotionCfg,
    #[case] ranging: RangingCfg,
    #[case] calibration: CalibrationCfg,
    #[case] needle: &str,
) {
    let err = built_with(motion, ranging, calibration).expect_err("invalid config");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => {
            assert!(msg.contains(needle), "{msg} should mention {needle}")
        }
        other => panic!("expected InvalidConfig, got: {other:?}"),
    }
}

#[test]
fn defaults_build() {
    let s = built_with(
        MotionCfg::default(),
        RangingCfg::default(),
        CalibrationCfg::default(),
    )
    .expect("defaults are valid");
    assert_eq!(s.motion_cfg().tolerance_100ths, 500);
    assert_eq!(s.tick(), std::time::Duration::from_millis(100));
}
