//! The motion control loop (`ShutterCore`).
//!
//! One operation slot shared by movements and calibration. Each `step()`
//! takes one distance sample, gates it against the physical band, publishes
//! the resulting position and advances the active operation. The core never
//! sleeps; pacing belongs to whoever drives it (`run()` or the service).

use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::WrapErr;
use shutter_hardware::echo::in_band;
use shutter_traits::clock::Clock;
use shutter_traits::{Actuator, Direction, DistanceSensor, KeyValueStore};

use crate::calibration::{CalibrationRun, Phase, StallDetector, mean_cm};
use crate::config::{CalibrationCfg, MotionCfg, RangingCfg};
use crate::error::{AbortReason, Result, ShutterError};
use crate::hw_error::map_hw_error;
use crate::position::{CalibrationEndpoints, FULL_SCALE, PositionEstimator, SharedPosition};
use crate::status::{MotionStatus, OperationKind, Outcome};
use crate::store::CalibrationStore;

pub(crate) type DynStore = CalibrationStore<Box<dyn KeyValueStore + Send>>;

#[derive(Debug, Clone)]
pub(crate) enum Operation {
    Idle,
    Moving {
        direction: Direction,
        target: Option<u16>,
        /// Position seen on the previous tick, for detecting a jump past the target.
        last: Option<u16>,
    },
    Calibrating(CalibrationRun),
}

/// What `begin_target` decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStart {
    /// Motor energized toward the target.
    Driving(Direction),
    /// Already inside the tolerance band; nothing was energized.
    AlreadyAt(u16),
}

pub struct ShutterCore<A: Actuator, S: DistanceSensor> {
    pub(crate) actuator: A,
    pub(crate) sensor: S,
    pub(crate) motion: MotionCfg,
    pub(crate) ranging: RangingCfg,
    pub(crate) calibration: CalibrationCfg,
    pub(crate) estimator: PositionEstimator,
    pub(crate) store: Option<DynStore>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) epoch: Instant,
    pub(crate) position: Arc<SharedPosition>,
    pub(crate) last_distance_cm: Option<f32>,
    pub(crate) op: Operation,
    pub(crate) run_id: u64,
    pub(crate) started_ms: u64,
    pub(crate) stall: StallDetector,
}

impl<A: Actuator, S: DistanceSensor> core::fmt::Debug for ShutterCore<A, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShutterCore")
            .field("endpoints", &self.estimator.endpoints)
            .field("position", &self.position.load())
            .field("last_distance_cm", &self.last_distance_cm)
            .field("active", &self.active())
            .finish()
    }
}

impl<A: Actuator, S: DistanceSensor> ShutterCore<A, S> {
    /// Last published position in hundredths of a percent, if known.
    pub fn position(&self) -> Option<u16> {
        self.position.load()
    }

    /// Handle to the lock-free position cell.
    pub fn shared_position(&self) -> Arc<SharedPosition> {
        self.position.clone()
    }

    pub fn last_distance_cm(&self) -> Option<f32> {
        self.last_distance_cm
    }

    pub fn endpoints(&self) -> CalibrationEndpoints {
        self.estimator.endpoints
    }

    /// Replace the endpoints and re-derive the position from the last sample.
    pub fn set_endpoints(&mut self, endpoints: CalibrationEndpoints) {
        self.estimator.endpoints = endpoints;
        match self.last_distance_cm {
            Some(cm) => self.publish(cm),
            None => self.position.store(None),
        }
    }

    pub fn motion_cfg(&self) -> &MotionCfg {
        &self.motion
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.motion.tick_ms)
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        self.clock.clone()
    }

    pub fn active(&self) -> Option<OperationKind> {
        match self.op {
            Operation::Idle => None,
            Operation::Moving { .. } => Some(OperationKind::Movement),
            Operation::Calibrating(_) => Some(OperationKind::Calibration),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active().is_some()
    }

    /// Identifier of the most recently started operation.
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Energize toward `direction`. With a target the movement completes
    /// inside the tolerance band; without one it completes at end of travel.
    pub fn begin_movement(&mut self, direction: Direction, target: Option<u16>) -> Result<()> {
        if let Some(t) = target {
            check_target(t)?;
            self.estimator
                .endpoints
                .check()
                .map_err(|e| eyre::Report::new(ShutterError::InvalidPosition(e)))?;
        }
        self.preempt()?;
        self.begin_run();
        self.op = Operation::Moving {
            direction,
            target,
            last: self.position.load(),
        };
        self.stall.reset(self.last_distance_cm);
        self.drive(direction)?;
        tracing::info!(%direction, target, "movement start");
        Ok(())
    }

    /// Move to `target`, picking the direction from a fresh reading.
    /// The shutter may have moved since the last published position (wall
    /// button), so that value is only used when the reading yields nothing.
    pub fn begin_target(&mut self, target: u16) -> Result<TargetStart> {
        check_target(target)?;
        self.estimator
            .endpoints
            .check()
            .map_err(|e| eyre::Report::new(ShutterError::InvalidPosition(e)))?;

        let cached = self.position.load();
        if self.sample()?.is_none() && cached.is_some() {
            tracing::debug!(?cached, "no fresh reading; using last known position");
        }
        let current = self
            .position
            .load()
            .ok_or_else(|| eyre::Report::new(ShutterError::Abort(AbortReason::NoSignal)))?;

        if current.abs_diff(target) < self.motion.tolerance_100ths {
            self.preempt()?;
            tracing::info!(target, position = current, "already within tolerance");
            return Ok(TargetStart::AlreadyAt(current));
        }
        let direction = if self.estimator.closedness(target) < self.estimator.closedness(current)
        {
            Direction::Open
        } else {
            Direction::Close
        };
        self.begin_movement(direction, Some(target))?;
        tracing::debug!(
            target,
            position = current,
            target_cm = ?self.estimator.distance_for(target).ok(),
            "heading for target"
        );
        Ok(TargetStart::Driving(direction))
    }

    /// Start the two-phase calibration: seek open, then seek close.
    pub fn begin_calibration(&mut self) -> Result<()> {
        self.preempt()?;
        self.begin_run();
        self.op = Operation::Calibrating(CalibrationRun::new(self.started_ms));
        self.stall.reset(self.last_distance_cm);
        self.drive(Direction::Open)?;
        tracing::info!("calibration start");
        Ok(())
    }

    /// Halt the outputs and return to idle. Returns whether anything was
    /// active; calling it while idle touches no output.
    pub fn stop(&mut self) -> Result<bool> {
        let Some(kind) = self.active() else {
            return Ok(false);
        };
        self.op = Operation::Idle;
        self.halt().wrap_err("stop")?;
        tracing::info!(operation = kind.as_str(), "stopped");
        Ok(true)
    }

    /// One-off reading; publishes the position like a control-loop sample.
    pub fn measure_now(&mut self) -> Result<Option<f32>> {
        self.sample()
    }

    /// One iteration of the control loop.
    pub fn step(&mut self) -> Result<MotionStatus> {
        if !self.is_active() {
            return Err(eyre::Report::new(ShutterError::State(
                "no active operation".into(),
            )));
        }
        let sample = match self.sample() {
            Ok(s) => s,
            Err(e) => {
                self.halt_quietly("sensor fault");
                self.op = Operation::Idle;
                return Err(e);
            }
        };
        let now = self.now_ms();
        match std::mem::replace(&mut self.op, Operation::Idle) {
            Operation::Idle => Ok(MotionStatus::Complete(Outcome::Stopped)),
            Operation::Moving {
                direction,
                target,
                last,
            } => self.step_movement(direction, target, last, sample, now),
            Operation::Calibrating(run) => self.step_calibration(run, sample, now),
        }
    }

    /// Step until the active operation resolves, sleeping one tick between steps.
    pub fn run(&mut self) -> Result<Outcome> {
        let tick = self.tick();
        loop {
            match self.step()? {
                MotionStatus::Running => self.clock.sleep(tick),
                MotionStatus::Complete(outcome) => return Ok(outcome),
                MotionStatus::Aborted(e) => return Err(eyre::Report::new(e)),
            }
        }
    }

    // ── Private: per-operation logic ─────────────────────────────────────────

    fn step_movement(
        &mut self,
        direction: Direction,
        target: Option<u16>,
        last: Option<u16>,
        sample: Option<f32>,
        now: u64,
    ) -> Result<MotionStatus> {
        let elapsed_ms = now.saturating_sub(self.started_ms);
        if elapsed_ms >= self.motion.max_move_ms {
            self.halt_quietly("max-run cap");
            tracing::warn!(%direction, elapsed_ms, "movement exceeded max run time");
            return Ok(MotionStatus::Aborted(ShutterError::Abort(
                AbortReason::MaxRuntime,
            )));
        }

        let position = self.position.load();
        match target {
            Some(t) => {
                if let Some(p) = position
                    && (p.abs_diff(t) < self.motion.tolerance_100ths || straddles(last, p, t))
                {
                    self.halt().wrap_err("halt at target")?;
                    tracing::info!(target = t, position = p, elapsed_ms, "target reached");
                    return Ok(MotionStatus::Complete(Outcome::TargetReached {
                        position: p,
                    }));
                }
            }
            None => {
                if let Some(cm) = sample
                    && self.stall.observe(cm)
                {
                    self.halt().wrap_err("halt at end of travel")?;
                    tracing::info!(%direction, ?position, cm, "end of travel");
                    return Ok(MotionStatus::Complete(Outcome::EndOfTravel { position }));
                }
            }
        }

        self.op = Operation::Moving {
            direction,
            target,
            last: position.or(last),
        };
        Ok(MotionStatus::Running)
    }

    fn step_calibration(
        &mut self,
        mut run: CalibrationRun,
        sample: Option<f32>,
        now: u64,
    ) -> Result<MotionStatus> {
        let phase_ms = now.saturating_sub(run.phase_started_ms);
        if phase_ms >= self.calibration.max_seek_ms {
            self.halt_quietly("seek timeout");
            tracing::warn!(phase = ?run.phase, phase_ms, "calibration phase timed out");
            return Ok(MotionStatus::Aborted(ShutterError::Abort(
                AbortReason::StallTimeout,
            )));
        }

        let settle_n = self.calibration.settle_samples.max(1) as usize;
        let phase = std::mem::replace(&mut run.phase, Phase::Seek(Direction::Open));
        run.phase = match phase {
            Phase::Seek(direction) => match sample {
                Some(cm) if self.stall.observe(cm) => {
                    self.halt().wrap_err("halt at end of travel")?;
                    tracing::debug!(%direction, cm, phase_ms, "end of travel detected");
                    run.phase_started_ms = now;
                    Phase::Settle {
                        direction,
                        samples: Vec::with_capacity(settle_n),
                    }
                }
                _ => Phase::Seek(direction),
            },
            Phase::Settle {
                direction,
                mut samples,
            } => {
                samples.extend(sample);
                if samples.len() < settle_n {
                    Phase::Settle { direction, samples }
                } else {
                    let Some(stable) = mean_cm(&samples) else {
                        return Err(eyre::Report::new(ShutterError::State(
                            "settle finished without samples".into(),
                        )));
                    };
                    match direction {
                        Direction::Open => {
                            tracing::info!(open_cm = stable, "open endpoint measured");
                            run.open_cm = Some(stable);
                            run.phase_started_ms = now;
                            self.stall.reset(Some(stable));
                            let next = direction.reversed();
                            self.drive(next)?;
                            Phase::Seek(next)
                        }
                        Direction::Close => {
                            tracing::info!(closed_cm = stable, "closed endpoint measured");
                            return self.finish_calibration(run.open_cm, stable);
                        }
                    }
                }
            }
        };

        self.op = Operation::Calibrating(run);
        Ok(MotionStatus::Running)
    }

    fn finish_calibration(&mut self, open: Option<f32>, closed: f32) -> Result<MotionStatus> {
        let Some(open) = open else {
            return Err(eyre::Report::new(ShutterError::State(
                "closed endpoint measured before the open one".into(),
            )));
        };
        if (closed - open).abs() < self.calibration.stall_delta_cm {
            tracing::warn!(
                open_cm = open,
                closed_cm = closed,
                "calibration endpoints too close; keeping previous calibration"
            );
            return Ok(MotionStatus::Aborted(ShutterError::Abort(
                AbortReason::DegenerateCalibration,
            )));
        }

        let endpoints = CalibrationEndpoints::new(open, closed);
        self.set_endpoints(endpoints);
        let persisted = match self.store.as_mut() {
            Some(store) => match store.save(&endpoints) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to persist calibration; keeping it in memory");
                    false
                }
            },
            None => false,
        };
        tracing::info!(open_cm = open, closed_cm = closed, persisted, "calibration complete");
        Ok(MotionStatus::Complete(Outcome::Calibrated {
            endpoints,
            persisted,
        }))
    }

    // ── Private: hardware access ─────────────────────────────────────────────

    fn sample(&mut self) -> Result<Option<f32>> {
        let timeout = Duration::from_millis(self.ranging.echo_timeout_ms);
        let raw = self
            .sensor
            .measure(timeout)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading distance")?;
        match raw {
            Some(cm) if in_band(cm) => {
                self.last_distance_cm = Some(cm);
                self.publish(cm);
                Ok(Some(cm))
            }
            Some(cm) => {
                tracing::trace!(cm, "sample out of band, dropped");
                Ok(None)
            }
            None => {
                tracing::trace!("no echo this tick");
                Ok(None)
            }
        }
    }

    fn publish(&self, cm: f32) {
        match self.estimator.estimate(cm) {
            Ok(p) => {
                tracing::trace!(cm, position = p, "position");
                self.position.store(Some(p));
            }
            Err(e) => {
                tracing::trace!(cm, error = %e, "position unavailable");
                self.position.store(None);
            }
        }
    }

    fn begin_run(&mut self) {
        self.run_id = self.run_id.wrapping_add(1);
        self.started_ms = self.now_ms();
    }

    /// Energize; on failure leave everything halted and idle.
    fn drive(&mut self, direction: Direction) -> Result<()> {
        if let Err(e) = self.actuator.drive(direction) {
            let err = map_hw_error(&*e);
            self.halt_quietly("drive failure");
            self.op = Operation::Idle;
            return Err(eyre::Report::new(err)).wrap_err_with(|| format!("drive {direction}"));
        }
        Ok(())
    }

    fn halt(&mut self) -> Result<()> {
        self.actuator
            .halt()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("actuator halt")
    }

    fn halt_quietly(&mut self, context: &'static str) {
        if let Err(e) = self.halt() {
            tracing::warn!(error = %e, context, "halt failed");
        }
    }

    fn preempt(&mut self) -> Result<()> {
        if self.stop()? {
            tracing::debug!("previous operation superseded");
        }
        Ok(())
    }

    #[inline]
    fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }
}

/// True when the move jumped over `target` between two ticks without a
/// sample landing inside the tolerance band.
fn straddles(last: Option<u16>, position: u16, target: u16) -> bool {
    match last {
        Some(prev) if prev != position => {
            (prev < target && position >= target) || (prev > target && position <= target)
        }
        _ => false,
    }
}

fn check_target(target: u16) -> Result<()> {
    if target > FULL_SCALE {
        return Err(eyre::Report::new(ShutterError::Config(format!(
            "target {target} exceeds {FULL_SCALE}"
        ))));
    }
    Ok(())
}
