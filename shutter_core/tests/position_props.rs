use proptest::prelude::*;
use shutter_core::mocks::{RecordingActuator, ScriptedSensor};
use shutter_core::{
    CalibrationEndpoints, FULL_SCALE, MotionStatus, PositionConvention, Shutter,
    percent_for_distance,
};
use shutter_traits::Direction;
use shutter_traits::clock::test_clock::TestClock;

fn endpoints() -> impl Strategy<Value = CalibrationEndpoints> {
    (1.0f32..399.0, 1.0f32..399.0)
        .prop_filter("distinct endpoints", |(o, c)| (o - c).abs() > 1.0)
        .prop_map(|(o, c)| CalibrationEndpoints::new(o, c))
}

proptest! {
    #[test]
    fn position_is_clamped(ep in endpoints(), d in 0.1f32..399.9) {
        for conv in [PositionConvention::ClosedIsFull, PositionConvention::OpenIsFull] {
            let p = percent_for_distance(d, &ep, conv).unwrap();
            prop_assert!(p <= FULL_SCALE);
        }
    }

    #[test]
    fn position_is_monotonic_in_distance(ep in endpoints(), a in 0.1f32..399.9, b in 0.1f32..399.9) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let p_lo = percent_for_distance(lo, &ep, PositionConvention::ClosedIsFull).unwrap();
        let p_hi = percent_for_distance(hi, &ep, PositionConvention::ClosedIsFull).unwrap();
        // mounted either way round, the closed endpoint still reads as 10000
        if ep.span_cm() > 0.0 {
            prop_assert!(p_lo <= p_hi);
        } else {
            prop_assert!(p_lo >= p_hi);
        }
    }

    #[test]
    fn conventions_mirror(ep in endpoints(), d in 0.1f32..399.9) {
        let closed = percent_for_distance(d, &ep, PositionConvention::ClosedIsFull).unwrap();
        let open = percent_for_distance(d, &ep, PositionConvention::OpenIsFull).unwrap();
        prop_assert_eq!(closed + open, FULL_SCALE);
    }

    #[test]
    fn out_of_band_samples_never_move_the_position(
        first in 11.0f32..99.0,
        junk in prop::collection::vec(prop_oneof![
            Just(None),
            Just(Some(0.0f32)),
            (400.0f32..5_000.0).prop_map(Some),
            (-100.0f32..0.0).prop_map(Some),
        ], 1..20),
    ) {
        let mut script = vec![Some(first)];
        script.extend(junk.iter().copied());
        let mut s = Shutter::builder()
            .with_actuator(RecordingActuator::new())
            .with_sensor(ScriptedSensor::new(script))
            .with_endpoints(CalibrationEndpoints::new(10.0, 100.0))
            .with_clock(TestClock::new())
            .build()
            .unwrap();
        s.begin_movement(Direction::Close, None).unwrap();
        prop_assert!(matches!(s.step().unwrap(), MotionStatus::Running));
        let known = s.position();
        prop_assert!(known.is_some());
        for _ in 0..junk.len() {
            prop_assert!(matches!(s.step().unwrap(), MotionStatus::Running));
            prop_assert_eq!(s.position(), known);
            prop_assert_eq!(s.last_distance_cm(), Some(first));
        }
    }
}
