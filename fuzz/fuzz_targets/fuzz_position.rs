#![no_main]
use libfuzzer_sys::fuzz_target;
use shutter_core::{CalibrationEndpoints, FULL_SCALE, PositionConvention, percent_for_distance};

fuzz_target!(|input: (f32, f32, f32, bool)| {
    let (d, open, closed, mirrored) = input;
    let ep = CalibrationEndpoints::new(open, closed);
    let conv = if mirrored {
        PositionConvention::OpenIsFull
    } else {
        PositionConvention::ClosedIsFull
    };
    if let Ok(p) = percent_for_distance(d, &ep, conv) {
        assert!(p <= FULL_SCALE);
    }
});
