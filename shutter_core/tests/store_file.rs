use std::fs;

use shutter_core::mocks::{RecordingActuator, ScriptedSensor};
use shutter_core::store::{CLOSED_KEY, OPEN_KEY};
use shutter_core::{CalibrationEndpoints, CalibrationStore, Outcome, Shutter, TomlFileStore};
use shutter_traits::KeyValueStore;
use shutter_traits::clock::test_clock::TestClock;

fn plateau_script(open: f32, closed: f32) -> Vec<f32> {
    let mut v = vec![40.0];
    v.extend(std::iter::repeat_n(open, 27));
    v.push(90.0);
    v.extend(std::iter::repeat_n(closed, 27));
    v
}

#[test]
fn calibration_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("calibration.toml");

    let mut s = Shutter::builder()
        .with_actuator(RecordingActuator::new())
        .with_sensor(ScriptedSensor::from_samples(plateau_script(14.0, 170.0)))
        .with_store(TomlFileStore::new(&path))
        .with_clock(TestClock::new())
        .build()
        .unwrap();
    s.begin_calibration().unwrap();
    assert!(matches!(
        s.run().unwrap(),
        Outcome::Calibrated { persisted: true, .. }
    ));
    drop(s);

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains(OPEN_KEY), "{text}");
    assert!(!path.with_extension("tmp").exists());

    let restarted = Shutter::builder()
        .with_actuator(RecordingActuator::new())
        .with_sensor(ScriptedSensor::from_samples([92.0]))
        .with_store(TomlFileStore::new(&path))
        .build()
        .unwrap();
    assert_eq!(
        restarted.endpoints(),
        CalibrationEndpoints::new(14.0, 170.0)
    );
}

#[test]
fn missing_file_loads_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let store = CalibrationStore::new(TomlFileStore::new(dir.path().join("absent.toml")));
    assert_eq!(store.load(), None);
    assert_eq!(
        store.load_or(CalibrationEndpoints::new(11.0, 99.0)),
        CalibrationEndpoints::new(11.0, 99.0)
    );
}

#[test]
fn corrupt_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calibration.toml");
    fs::write(&path, "this is = = not toml").unwrap();
    let s = Shutter::builder()
        .with_actuator(RecordingActuator::new())
        .with_sensor(ScriptedSensor::from_samples([50.0]))
        .with_store(TomlFileStore::new(&path))
        .build()
        .unwrap();
    assert_eq!(s.endpoints(), CalibrationEndpoints::default());
}

#[test]
fn one_stored_key_keeps_the_other_default() {
    let dir = tempfile::tempdir().unwrap();
    let mut kv = TomlFileStore::new(dir.path().join("calibration.toml"));
    kv.set(CLOSED_KEY, "140.5").unwrap();
    assert_eq!(kv.get(CLOSED_KEY).unwrap().as_deref(), Some("140.5"));
    let store = CalibrationStore::new(kv);
    assert_eq!(store.load(), Some(CalibrationEndpoints::new(10.0, 140.5)));
}

#[test]
fn failed_save_keeps_both_previous_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calibration.toml");
    let mut store = CalibrationStore::new(TomlFileStore::new(&path));
    store.save(&CalibrationEndpoints::new(12.0, 170.0)).unwrap();

    // a directory in the temp file's place makes the next rewrite fail
    fs::create_dir(path.with_extension("tmp")).unwrap();
    store
        .save(&CalibrationEndpoints::new(20.0, 150.0))
        .expect_err("blocked rewrite");

    assert_eq!(store.load(), Some(CalibrationEndpoints::new(12.0, 170.0)));
}
