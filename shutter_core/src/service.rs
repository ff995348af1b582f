//! Host-facing service: runs each operation on its own control-loop thread.
//!
//! The core sits behind a mutex that a loop holds only for one `step()`, so
//! `on_stop_command` can always get in between ticks. Each run carries a
//! cancel flag and the core's run id; a loop exits as soon as either says
//! its run is over, resolving its handle with `Outcome::Stopped`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel as xch;
use shutter_traits::Direction;
use shutter_traits::clock::Clock;

use crate::builder::Shutter;
use crate::controller::TargetStart;
use crate::error::{Result, ShutterError, shutter_error_of};
use crate::position::SharedPosition;
use crate::status::{MotionStatus, OperationKind, Outcome};

/// Notifications for subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ShutterEvent {
    Started {
        kind: OperationKind,
        direction: Option<Direction>,
        target: Option<u16>,
    },
    Position(u16),
    Finished(Outcome),
    Failed(ShutterError),
}

/// Resolves once the operation it was returned for ends.
#[derive(Debug)]
pub struct MotionHandle {
    rx: xch::Receiver<Result<Outcome>>,
}

impl MotionHandle {
    fn resolved(result: Result<Outcome>) -> Self {
        let (tx, rx) = xch::bounded(1);
        let _ = tx.send(result);
        Self { rx }
    }

    /// Block until the operation ends.
    pub fn wait(self) -> Result<Outcome> {
        self.rx.recv().map_err(|_| {
            eyre::Report::new(ShutterError::State("control loop vanished".into()))
        })?
    }

    /// Like `wait`, giving up with `ShutterError::Timeout` after `timeout`.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Outcome> {
        match self.rx.recv_timeout(timeout) {
            Ok(r) => r,
            Err(xch::RecvTimeoutError::Timeout) => Err(eyre::Report::new(ShutterError::Timeout)),
            Err(xch::RecvTimeoutError::Disconnected) => Err(eyre::Report::new(
                ShutterError::State("control loop vanished".into()),
            )),
        }
    }
}

struct ActiveRun {
    cancel: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

#[derive(Clone, Default)]
struct Subscribers(Arc<Mutex<Vec<xch::Sender<ShutterEvent>>>>);

impl Subscribers {
    fn emit(&self, event: ShutterEvent) {
        if let Ok(mut subs) = self.0.lock() {
            subs.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

pub struct ShutterService {
    core: Arc<Mutex<Shutter>>,
    position: Arc<SharedPosition>,
    clock: Arc<dyn Clock + Send + Sync>,
    tick: Duration,
    run: Mutex<Option<ActiveRun>>,
    subscribers: Subscribers,
}

impl ShutterService {
    pub fn new(shutter: Shutter) -> Self {
        let position = shutter.shared_position();
        let clock = shutter.clock();
        let tick = shutter.tick();
        Self {
            core: Arc::new(Mutex::new(shutter)),
            position,
            clock,
            tick,
            run: Mutex::new(None),
            subscribers: Subscribers::default(),
        }
    }

    /// Open or close, optionally toward a target. Supersedes a running movement.
    pub fn on_movement_command(
        &self,
        direction: Direction,
        target: Option<u16>,
    ) -> Result<MotionHandle> {
        let mut run = self.lock_run()?;
        let mut core = self.lock_core()?;
        if core.active() == Some(OperationKind::Calibration) {
            return Err(eyre::Report::new(ShutterError::Busy("calibration")));
        }
        cancel(&mut run);
        core.begin_movement(direction, target)?;
        let id = core.run_id();
        drop(core);
        self.subscribers.emit(ShutterEvent::Started {
            kind: OperationKind::Movement,
            direction: Some(direction),
            target,
        });
        Ok(self.spawn(&mut run, id))
    }

    /// Move to `percent100ths`; the direction follows from the current position.
    pub fn on_target_command(&self, percent100ths: u16) -> Result<MotionHandle> {
        let mut run = self.lock_run()?;
        let mut core = self.lock_core()?;
        if core.active() == Some(OperationKind::Calibration) {
            return Err(eyre::Report::new(ShutterError::Busy("calibration")));
        }
        cancel(&mut run);
        match core.begin_target(percent100ths)? {
            TargetStart::AlreadyAt(position) => {
                drop(core);
                self.publish_position();
                let outcome = Outcome::TargetReached { position };
                self.subscribers
                    .emit(ShutterEvent::Finished(outcome.clone()));
                Ok(MotionHandle::resolved(Ok(outcome)))
            }
            TargetStart::Driving(direction) => {
                let id = core.run_id();
                drop(core);
                self.subscribers.emit(ShutterEvent::Started {
                    kind: OperationKind::Movement,
                    direction: Some(direction),
                    target: Some(percent100ths),
                });
                Ok(self.spawn(&mut run, id))
            }
        }
    }

    /// Halt immediately. Safe to call at any time, any number of times.
    pub fn on_stop_command(&self) -> Result<()> {
        let mut run = self.lock_run()?;
        cancel(&mut run);
        let stopped = self.lock_core()?.stop()?;
        if stopped {
            tracing::info!("stop command");
        }
        Ok(())
    }

    /// Run the calibration sequence. Rejected while anything else is active.
    pub fn on_calibration_command(&self) -> Result<MotionHandle> {
        let mut run = self.lock_run()?;
        let mut core = self.lock_core()?;
        if let Some(kind) = core.active() {
            return Err(eyre::Report::new(ShutterError::Busy(kind.as_str())));
        }
        core.begin_calibration()?;
        let id = core.run_id();
        drop(core);
        self.subscribers.emit(ShutterEvent::Started {
            kind: OperationKind::Calibration,
            direction: Some(Direction::Open),
            target: None,
        });
        Ok(self.spawn(&mut run, id))
    }

    /// Last published position, without touching the sensor.
    pub fn current_position(&self) -> Option<u16> {
        self.position.load()
    }

    /// Stream of events from now on.
    pub fn subscribe(&self) -> xch::Receiver<ShutterEvent> {
        let (tx, rx) = xch::unbounded();
        if let Ok(mut subs) = self.subscribers.0.lock() {
            subs.push(tx);
        }
        rx
    }

    /// Exclusive access to the core between ticks.
    pub fn with_core<R>(&self, f: impl FnOnce(&mut Shutter) -> R) -> Result<R> {
        let mut core = self.lock_core()?;
        Ok(f(&mut core))
    }

    fn spawn(&self, run: &mut Option<ActiveRun>, id: u64) -> MotionHandle {
        let (tx, rx) = xch::bounded(1);
        let cancel_flag = Arc::new(AtomicBool::new(false));
        let ctx = LoopCtx {
            core: self.core.clone(),
            position: self.position.clone(),
            clock: self.clock.clone(),
            tick: self.tick,
            cancel: cancel_flag.clone(),
            subscribers: self.subscribers.clone(),
            id,
        };
        let join = std::thread::Builder::new()
            .name(format!("shutter-run-{id}"))
            .spawn(move || {
                let result = ctx.run();
                match &result {
                    Ok(outcome) => ctx
                        .subscribers
                        .emit(ShutterEvent::Finished(outcome.clone())),
                    Err(e) => ctx
                        .subscribers
                        .emit(ShutterEvent::Failed(shutter_error_of(e))),
                }
                let _ = tx.send(result);
            });
        let join = match join {
            Ok(j) => Some(j),
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn control loop; halting");
                if let Ok(mut core) = self.core.lock()
                    && let Err(e) = core.stop()
                {
                    tracing::warn!(error = %e, "halt failed after spawn failure");
                }
                return MotionHandle::resolved(Err(eyre::Report::new(ShutterError::State(
                    format!("spawn control loop: {e}"),
                ))));
            }
        };
        *run = Some(ActiveRun {
            cancel: cancel_flag,
            join,
        });
        MotionHandle { rx }
    }

    fn publish_position(&self) {
        if let Some(p) = self.position.load() {
            self.subscribers.emit(ShutterEvent::Position(p));
        }
    }

    fn lock_core(&self) -> Result<MutexGuard<'_, Shutter>> {
        self.core
            .lock()
            .map_err(|_| eyre::Report::new(ShutterError::State("core lock poisoned".into())))
    }

    fn lock_run(&self) -> Result<MutexGuard<'_, Option<ActiveRun>>> {
        self.run
            .lock()
            .map_err(|_| eyre::Report::new(ShutterError::State("run lock poisoned".into())))
    }
}

impl Drop for ShutterService {
    fn drop(&mut self) {
        let run = match self.run.get_mut() {
            Ok(r) => r.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(mut run) = run {
            run.cancel.store(true, Ordering::Release);
            if let Ok(mut core) = self.core.lock()
                && let Err(e) = core.stop()
            {
                tracing::warn!(error = %e, "halt failed during shutdown");
            }
            if let Some(join) = run.join.take()
                && join.join().is_err()
            {
                tracing::warn!("control loop panicked during shutdown");
            }
        }
    }
}

/// Flag the current run as over without waiting for its thread.
fn cancel(run: &mut Option<ActiveRun>) {
    if let Some(r) = run.take() {
        r.cancel.store(true, Ordering::Release);
    }
}

struct LoopCtx {
    core: Arc<Mutex<Shutter>>,
    position: Arc<SharedPosition>,
    clock: Arc<dyn Clock + Send + Sync>,
    tick: Duration,
    cancel: Arc<AtomicBool>,
    subscribers: Subscribers,
    id: u64,
}

impl LoopCtx {
    fn run(&self) -> Result<Outcome> {
        let mut last_position = self.position.load();
        loop {
            if self.cancel.load(Ordering::Acquire) {
                return Ok(Outcome::Stopped);
            }
            let status = {
                let mut core = match self.core.lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if core.run_id() != self.id || !core.is_active() {
                    return Ok(Outcome::Stopped);
                }
                core.step()
            };

            let now_position = self.position.load();
            if now_position != last_position {
                last_position = now_position;
                if let Some(p) = now_position {
                    self.subscribers.emit(ShutterEvent::Position(p));
                }
            }

            match status? {
                MotionStatus::Running => {}
                MotionStatus::Complete(outcome) => return Ok(outcome),
                MotionStatus::Aborted(e) => {
                    tracing::error!(error = %e, "operation aborted");
                    return Err(eyre::Report::new(e));
                }
            }
            self.clock.sleep(self.tick);
        }
    }
}
