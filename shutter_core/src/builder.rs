//! Type-state builder for `Shutter`.
//!
//! The builder enforces at compile time that an actuator and a sensor are
//! provided before `build()` is available. `try_build()` is always available
//! for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use shutter_traits::clock::{Clock, MonotonicClock};
use shutter_traits::{Actuator, DistanceSensor, KeyValueStore};

use crate::calibration::StallDetector;
use crate::config::{CalibrationCfg, MotionCfg, RangingCfg};
use crate::controller::{Operation, ShutterCore};
use crate::error::{BuildError, Result};
use crate::position::{CalibrationEndpoints, PositionEstimator, SharedPosition};
use crate::store::CalibrationStore;

/// Dynamically dispatched core, the shape the service and the CLI use.
pub type Shutter = ShutterCore<Box<dyn Actuator + Send>, Box<dyn DistanceSensor + Send>>;

impl Shutter {
    /// Start building a Shutter.
    pub fn builder() -> ShutterBuilder<Missing, Missing> {
        ShutterBuilder::default()
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `Shutter`. All fields are validated on `build()`.
pub struct ShutterBuilder<A, S> {
    actuator: Option<Box<dyn Actuator + Send>>,
    sensor: Option<Box<dyn DistanceSensor + Send>>,
    motion: Option<MotionCfg>,
    ranging: Option<RangingCfg>,
    calibration: Option<CalibrationCfg>,
    endpoints: Option<CalibrationEndpoints>,
    store: Option<Box<dyn KeyValueStore + Send>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    _a: PhantomData<A>,
    _s: PhantomData<S>,
}

impl Default for ShutterBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            actuator: None,
            sensor: None,
            motion: None,
            ranging: None,
            calibration: None,
            endpoints: None,
            store: None,
            clock: None,
            _a: PhantomData,
            _s: PhantomData,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(motion: &MotionCfg, ranging: &RangingCfg, calibration: &CalibrationCfg) -> Result<()> {
    if motion.tick_ms == 0 {
        return Err(invalid("tick_ms must be >= 1"));
    }
    if motion.tolerance_100ths == 0 || motion.tolerance_100ths > 5_000 {
        return Err(invalid("tolerance_100ths must be in [1, 5000]"));
    }
    if motion.max_move_ms < motion.tick_ms {
        return Err(invalid("max_move_ms must be >= tick_ms"));
    }
    if ranging.echo_timeout_ms == 0 {
        return Err(invalid("echo_timeout_ms must be >= 1"));
    }
    if !(calibration.stall_delta_cm.is_finite() && calibration.stall_delta_cm > 0.0) {
        return Err(invalid("stall_delta_cm must be > 0"));
    }
    if calibration.stall_ticks == 0 {
        return Err(invalid("stall_ticks must be >= 1"));
    }
    if calibration.settle_samples == 0 {
        return Err(invalid("settle_samples must be >= 1"));
    }
    if calibration.max_seek_ms < motion.tick_ms {
        return Err(invalid("max_seek_ms must be >= tick_ms"));
    }
    Ok(())
}

impl<A, S> ShutterBuilder<A, S> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<Shutter> {
        let actuator = self
            .actuator
            .ok_or_else(|| eyre::Report::new(BuildError::MissingActuator))?;
        let sensor = self
            .sensor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;
        let motion = self.motion.unwrap_or_default();
        let ranging = self.ranging.unwrap_or_default();
        let calibration = self.calibration.unwrap_or_default();
        validate(&motion, &ranging, &calibration)?;

        let store = self.store.map(CalibrationStore::new);
        let endpoints = match (self.endpoints, store.as_ref()) {
            (Some(ep), _) => ep,
            (None, Some(s)) => s.load_or(calibration.default_endpoints),
            (None, None) => calibration.default_endpoints,
        };
        if let Err(e) = endpoints.check() {
            tracing::warn!(
                error = %e,
                open_cm = endpoints.open_distance_cm,
                closed_cm = endpoints.closed_distance_cm,
                "calibration unusable; target moves disabled until recalibrated"
            );
        }
        tracing::debug!(
            open_cm = endpoints.open_distance_cm,
            closed_cm = endpoints.closed_distance_cm,
            "calibration loaded"
        );

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };
        let epoch = clock.now();

        Ok(ShutterCore {
            actuator,
            sensor,
            estimator: PositionEstimator::new(endpoints, motion.convention),
            stall: StallDetector::new(calibration.stall_delta_cm, calibration.stall_ticks),
            motion,
            ranging,
            calibration,
            store,
            clock,
            epoch,
            position: Arc::new(SharedPosition::new()),
            last_distance_cm: None,
            op: Operation::Idle,
            run_id: 0,
            started_ms: 0,
        })
    }
}

/// Chainable setters that do not affect type-state.
impl<A, S> ShutterBuilder<A, S> {
    pub fn with_motion(mut self, motion: MotionCfg) -> Self {
        self.motion = Some(motion);
        self
    }
    pub fn with_ranging(mut self, ranging: RangingCfg) -> Self {
        self.ranging = Some(ranging);
        self
    }
    pub fn with_calibration_cfg(mut self, calibration: CalibrationCfg) -> Self {
        self.calibration = Some(calibration);
        self
    }
    /// Use these endpoints instead of loading them from the store.
    pub fn with_endpoints(mut self, endpoints: CalibrationEndpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }
    /// Persist calibrations here; also the source of the startup endpoints.
    pub fn with_store(mut self, store: impl KeyValueStore + Send + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }
}

// Setters that advance type-state
impl<S> ShutterBuilder<Missing, S> {
    pub fn with_actuator(
        self,
        actuator: impl Actuator + Send + 'static,
    ) -> ShutterBuilder<Set, S> {
        ShutterBuilder {
            actuator: Some(Box::new(actuator)),
            sensor: self.sensor,
            motion: self.motion,
            ranging: self.ranging,
            calibration: self.calibration,
            endpoints: self.endpoints,
            store: self.store,
            clock: self.clock,
            _a: PhantomData,
            _s: PhantomData,
        }
    }
}

impl<A> ShutterBuilder<A, Missing> {
    pub fn with_sensor(
        self,
        sensor: impl DistanceSensor + Send + 'static,
    ) -> ShutterBuilder<A, Set> {
        ShutterBuilder {
            actuator: self.actuator,
            sensor: Some(Box::new(sensor)),
            motion: self.motion,
            ranging: self.ranging,
            calibration: self.calibration,
            endpoints: self.endpoints,
            store: self.store,
            clock: self.clock,
            _a: PhantomData,
            _s: PhantomData,
        }
    }
}

impl ShutterBuilder<Set, Set> {
    /// Validate and build the Shutter. Only available once actuator and sensor are set.
    pub fn build(self) -> Result<Shutter> {
        self.try_build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{RecordingActuator, ScriptedSensor};
    use crate::store::{CLOSED_KEY, MemoryStore, OPEN_KEY};

    #[test]
    fn startup_endpoints_come_from_store_then_defaults() {
        let kv = MemoryStore::new();
        kv.insert(OPEN_KEY, "14.5");
        let shutter = Shutter::builder()
            .with_actuator(RecordingActuator::new())
            .with_sensor(ScriptedSensor::from_samples([50.0]))
            .with_store(kv)
            .build()
            .unwrap();
        assert_eq!(shutter.endpoints(), CalibrationEndpoints::new(14.5, 100.0));
        assert_eq!(shutter.position(), None);
        assert!(!shutter.is_active());
    }

    #[test]
    fn explicit_endpoints_win_over_store() {
        let kv = MemoryStore::new();
        kv.insert(OPEN_KEY, "14.5");
        kv.insert(CLOSED_KEY, "160");
        let shutter = Shutter::builder()
            .with_actuator(RecordingActuator::new())
            .with_sensor(ScriptedSensor::from_samples([50.0]))
            .with_store(kv)
            .with_endpoints(CalibrationEndpoints::new(20.0, 90.0))
            .build()
            .unwrap();
        assert_eq!(shutter.endpoints(), CalibrationEndpoints::new(20.0, 90.0));
    }
}
