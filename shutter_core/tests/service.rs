use std::time::Duration;

use shutter_core::{
    AbortReason, CalibrationEndpoints, MotionCfg, OperationKind, Outcome, Shutter, ShutterError,
    ShutterEvent, ShutterService,
};
use shutter_hardware::sim::SimRig;
use shutter_traits::Direction;

const WAIT: Duration = Duration::from_secs(20);

fn service(rig: &SimRig, motion: MotionCfg) -> ShutterService {
    let shutter = Shutter::builder()
        .with_actuator(rig.actuator())
        .with_sensor(rig.sensor())
        .with_endpoints(CalibrationEndpoints::new(12.0, 180.0))
        .with_motion(motion)
        .build()
        .expect("build");
    ShutterService::new(shutter)
}

fn fast() -> MotionCfg {
    MotionCfg {
        tick_ms: 1,
        ..MotionCfg::default()
    }
}

fn shutter_error(err: &eyre::Report) -> Option<&ShutterError> {
    err.downcast_ref::<ShutterError>()
}

#[test]
fn calibration_runs_to_completion_on_a_loop_thread() {
    let rig = SimRig::new(20.0, 160.0, 60.0, 4.0);
    let svc = service(&rig, fast());
    let outcome = svc
        .on_calibration_command()
        .unwrap()
        .wait_timeout(WAIT)
        .unwrap();
    match outcome {
        Outcome::Calibrated { endpoints, persisted } => {
            assert_eq!(endpoints, CalibrationEndpoints::new(20.0, 160.0));
            // no store configured
            assert!(!persisted);
        }
        other => panic!("expected Calibrated, got {other:?}"),
    }
    assert_eq!(svc.current_position(), Some(10_000));
    assert_eq!(rig.snapshot().motion, None);
}

#[test]
fn target_command_reports_events_in_order() {
    let rig = SimRig::new(12.0, 180.0, 180.0, 4.0);
    let svc = service(&rig, fast());
    let events = svc.subscribe();

    let outcome = svc
        .on_target_command(2_500)
        .unwrap()
        .wait_timeout(WAIT)
        .unwrap();
    let Outcome::TargetReached { position } = outcome else {
        panic!("expected TargetReached, got {outcome:?}");
    };
    assert!(position.abs_diff(2_500) < 500);

    let got: Vec<ShutterEvent> = events.try_iter().collect();
    assert_eq!(
        got.first(),
        Some(&ShutterEvent::Started {
            kind: OperationKind::Movement,
            direction: Some(Direction::Open),
            target: Some(2_500),
        })
    );
    assert_eq!(
        got.last(),
        Some(&ShutterEvent::Finished(Outcome::TargetReached { position }))
    );
    assert!(
        got.iter()
            .any(|e| matches!(e, ShutterEvent::Position(p) if *p == position))
    );
}

#[test]
fn target_inside_tolerance_resolves_without_moving() {
    let rig = SimRig::new(12.0, 180.0, 96.0, 4.0);
    let svc = service(&rig, fast());
    let outcome = svc.on_target_command(5_100).unwrap().wait().unwrap();
    assert_eq!(outcome, Outcome::TargetReached { position: 5_000 });
    assert_eq!(rig.snapshot().drive_count, 0);
}

#[test]
fn calibration_blocks_movements_and_stop_cancels_it() {
    // slow rig: the open seek takes hundreds of ticks
    let rig = SimRig::new(12.0, 180.0, 170.0, 0.5);
    let svc = service(
        &rig,
        MotionCfg {
            tick_ms: 5,
            ..MotionCfg::default()
        },
    );
    let handle = svc.on_calibration_command().unwrap();

    let err = svc.on_movement_command(Direction::Close, None).unwrap_err();
    assert_eq!(shutter_error(&err), Some(&ShutterError::Busy("calibration")));
    let err = svc.on_target_command(1_000).unwrap_err();
    assert_eq!(shutter_error(&err), Some(&ShutterError::Busy("calibration")));
    let err = svc.on_calibration_command().unwrap_err();
    assert_eq!(shutter_error(&err), Some(&ShutterError::Busy("calibration")));

    svc.on_stop_command().unwrap();
    assert_eq!(handle.wait_timeout(WAIT).unwrap(), Outcome::Stopped);
    assert_eq!(rig.snapshot().motion, None);
    // a second stop is harmless
    svc.on_stop_command().unwrap();
}

#[test]
fn calibration_is_rejected_while_moving() {
    let rig = SimRig::new(12.0, 180.0, 170.0, 0.5);
    let svc = service(
        &rig,
        MotionCfg {
            tick_ms: 5,
            ..MotionCfg::default()
        },
    );
    let moving = svc.on_movement_command(Direction::Open, None).unwrap();
    let err = svc.on_calibration_command().unwrap_err();
    assert_eq!(shutter_error(&err), Some(&ShutterError::Busy("movement")));
    svc.on_stop_command().unwrap();
    assert_eq!(moving.wait_timeout(WAIT).unwrap(), Outcome::Stopped);
}

#[test]
fn new_movement_supersedes_running_one() {
    let rig = SimRig::new(12.0, 180.0, 100.0, 0.5);
    let svc = service(
        &rig,
        MotionCfg {
            tick_ms: 5,
            ..MotionCfg::default()
        },
    );
    let first = svc.on_movement_command(Direction::Open, None).unwrap();
    let second = svc.on_movement_command(Direction::Close, None).unwrap();
    assert_eq!(first.wait_timeout(WAIT).unwrap(), Outcome::Stopped);
    assert_eq!(rig.snapshot().motion, Some(Direction::Close));

    svc.on_stop_command().unwrap();
    assert_eq!(second.wait_timeout(WAIT).unwrap(), Outcome::Stopped);
    assert_eq!(rig.snapshot().motion, None);
}

#[test]
fn watchdog_abort_halts_and_fails_the_handle() {
    let rig = SimRig::new(12.0, 180.0, 100.0, 4.0);
    // no echo ever arrives, so end of travel is never detected
    rig.set_silent(true);
    let svc = service(
        &rig,
        MotionCfg {
            tick_ms: 2,
            max_move_ms: 50,
            ..MotionCfg::default()
        },
    );
    let events = svc.subscribe();
    let err = svc
        .on_movement_command(Direction::Close, None)
        .unwrap()
        .wait_timeout(WAIT)
        .unwrap_err();
    assert_eq!(
        shutter_error(&err),
        Some(&ShutterError::Abort(AbortReason::MaxRuntime))
    );
    assert_eq!(rig.snapshot().motion, None);
    assert!(
        events
            .try_iter()
            .any(|e| e == ShutterEvent::Failed(ShutterError::Abort(AbortReason::MaxRuntime)))
    );
}

#[test]
fn stop_when_idle_is_a_no_op() {
    let rig = SimRig::new(12.0, 180.0, 100.0, 4.0);
    let svc = service(&rig, fast());
    svc.on_stop_command().unwrap();
    svc.on_stop_command().unwrap();
    assert_eq!(rig.snapshot().halt_count, 0);
    assert_eq!(svc.current_position(), None);
}
