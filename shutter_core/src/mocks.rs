//! Test and helper fakes for driving the control loop without hardware.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shutter_traits::{Actuator, Direction, DistanceSensor, HwResult};

/// One call observed by [`RecordingActuator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCall {
    Drive(Direction),
    Halt,
}

/// Actuator that only records what it was asked to do. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    calls: Arc<Mutex<Vec<ActuatorCall>>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// True when the most recent call left the motor de-energized.
    pub fn is_halted(&self) -> bool {
        !matches!(self.calls().last(), Some(ActuatorCall::Drive(_)))
    }

    pub fn halt_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == ActuatorCall::Halt)
            .count()
    }

    fn push(&self, call: ActuatorCall) -> HwResult<()> {
        self.calls
            .lock()
            .map_err(|_| std::io::Error::other("actuator log poisoned"))?
            .push(call);
        Ok(())
    }
}

impl Actuator for RecordingActuator {
    fn drive(&mut self, direction: Direction) -> HwResult<()> {
        self.push(ActuatorCall::Drive(direction))
    }

    fn halt(&mut self) -> HwResult<()> {
        self.push(ActuatorCall::Halt)
    }
}

/// Sensor that replays a fixed script of samples, then repeats the last entry.
/// `None` entries model a missing echo.
#[derive(Debug, Clone)]
pub struct ScriptedSensor {
    script: VecDeque<Option<f32>>,
    last: Option<f32>,
    reads: usize,
}

impl ScriptedSensor {
    pub fn new(script: impl IntoIterator<Item = Option<f32>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            last: None,
            reads: 0,
        }
    }

    /// Script made only of valid samples.
    pub fn from_samples(samples: impl IntoIterator<Item = f32>) -> Self {
        Self::new(samples.into_iter().map(Some))
    }

    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl DistanceSensor for ScriptedSensor {
    fn measure(&mut self, _timeout: Duration) -> HwResult<Option<f32>> {
        self.reads += 1;
        if let Some(next) = self.script.pop_front() {
            self.last = next;
        }
        Ok(self.last)
    }
}

/// A sensor whose every read fails.
pub struct FailingSensor;

impl DistanceSensor for FailingSensor {
    fn measure(&mut self, _timeout: Duration) -> HwResult<Option<f32>> {
        Err(Box::new(std::io::Error::other("ranger unplugged")))
    }
}
