//! Simulated shutter: a door that travels between two mechanical stops
//! and a ranger that reports its distance.
//!
//! The actuator and the sensor share one state behind a mutex so the rig
//! can be driven from the control-loop thread while tests inspect it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use shutter_traits::{Actuator, Direction, DistanceSensor, HwResult};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SimState {
    pub distance_cm: f32,
    pub motion: Option<Direction>,
    /// Mechanical stop reached when opening.
    pub open_stop_cm: f32,
    /// Mechanical stop reached when closing.
    pub closed_stop_cm: f32,
    /// Travel per measurement while the motor runs.
    pub step_cm: f32,
    /// When set, the ranger never answers (disconnected echo line).
    pub silent: bool,
    pub drive_count: u32,
    pub halt_count: u32,
}

/// Shared handle to the simulated mechanics.
#[derive(Debug, Clone)]
pub struct SimRig {
    state: Arc<Mutex<SimState>>,
}

impl SimRig {
    pub fn new(open_stop_cm: f32, closed_stop_cm: f32, start_cm: f32, step_cm: f32) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                distance_cm: start_cm,
                motion: None,
                open_stop_cm,
                closed_stop_cm,
                step_cm: step_cm.abs(),
                silent: false,
                drive_count: 0,
                halt_count: 0,
            })),
        }
    }

    pub fn actuator(&self) -> SimActuator {
        SimActuator { rig: self.clone() }
    }

    pub fn sensor(&self) -> SimRanger {
        SimRanger { rig: self.clone() }
    }

    pub fn set_silent(&self, silent: bool) {
        if let Ok(mut s) = self.state.lock() {
            s.silent = silent;
        }
    }

    pub fn snapshot(&self) -> SimState {
        match self.state.lock() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> HwResult<R> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| std::io::Error::other("sim state poisoned"))?;
        Ok(f(&mut guard))
    }
}

pub struct SimActuator {
    rig: SimRig,
}

impl Actuator for SimActuator {
    fn drive(&mut self, direction: Direction) -> HwResult<()> {
        self.rig.with_state(|s| {
            s.motion = Some(direction);
            s.drive_count += 1;
        })?;
        debug!(%direction, "sim motor running");
        Ok(())
    }

    fn halt(&mut self) -> HwResult<()> {
        self.rig.with_state(|s| {
            s.motion = None;
            s.halt_count += 1;
        })?;
        debug!("sim motor halted");
        Ok(())
    }
}

pub struct SimRanger {
    rig: SimRig,
}

impl DistanceSensor for SimRanger {
    fn measure(&mut self, _timeout: Duration) -> HwResult<Option<f32>> {
        self.rig.with_state(|s| {
            if let Some(dir) = s.motion {
                let stop = match dir {
                    Direction::Open => s.open_stop_cm,
                    Direction::Close => s.closed_stop_cm,
                };
                let delta = stop - s.distance_cm;
                if delta.abs() <= s.step_cm {
                    s.distance_cm = stop;
                } else {
                    s.distance_cm += s.step_cm * delta.signum();
                }
            }
            if s.silent { None } else { Some(s.distance_cm) }
        })
    }
}

/// Replays a recorded distance trace, then repeats its last sample.
#[derive(Debug, Clone)]
pub struct TraceSensor {
    samples: Vec<f32>,
    idx: usize,
}

impl TraceSensor {
    pub fn new(samples: impl Into<Vec<f32>>) -> Self {
        Self {
            samples: samples.into(),
            idx: 0,
        }
    }
}

impl DistanceSensor for TraceSensor {
    fn measure(&mut self, _timeout: Duration) -> HwResult<Option<f32>> {
        let v = match self.samples.get(self.idx) {
            Some(v) => {
                self.idx += 1;
                Some(*v)
            }
            None => self.samples.last().copied(),
        };
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rig_travels_to_mechanical_stop_and_holds() {
        let rig = SimRig::new(10.0, 100.0, 50.0, 15.0);
        let mut act = rig.actuator();
        let mut sensor = rig.sensor();
        act.drive(Direction::Open).unwrap();
        let readings: Vec<f32> = (0..5)
            .map(|_| sensor.measure(Duration::ZERO).unwrap().unwrap())
            .collect();
        assert_eq!(readings, vec![35.0, 20.0, 10.0, 10.0, 10.0]);
        act.halt().unwrap();
        assert_eq!(rig.snapshot().motion, None);
    }

    #[test]
    fn silent_rig_returns_no_sample() {
        let rig = SimRig::new(10.0, 100.0, 50.0, 1.0);
        rig.set_silent(true);
        let mut sensor = rig.sensor();
        assert_eq!(sensor.measure(Duration::ZERO).unwrap(), None);
    }

    #[test]
    fn trace_repeats_last_sample() {
        let mut t = TraceSensor::new([1.0, 2.0]);
        let got: Vec<_> = (0..4)
            .map(|_| t.measure(Duration::ZERO).unwrap())
            .collect();
        assert_eq!(got, vec![Some(1.0), Some(2.0), Some(2.0), Some(2.0)]);
    }
}
