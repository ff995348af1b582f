//! Hardware assembly and command execution.

use std::path::Path;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use eyre::WrapErr;
use serde_json::json;
use shutter_config::Config;
use shutter_core::{
    AbortReason, CalibrationCfg, CalibrationEndpoints, MotionCfg, Outcome, RangingCfg, Shutter,
    ShutterError, ShutterService, TomlFileStore,
};
use shutter_traits::{Actuator, Direction, DistanceSensor};

use crate::cli::{CliLimits, Commands, LAST_LIMITS};

type Parts = (Box<dyn Actuator + Send>, Box<dyn DistanceSensor + Send>);

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn hardware_parts(cfg: &Config, trace: Option<&Path>) -> eyre::Result<Parts> {
    use shutter_config::{DriveStyle, StopLine};
    use shutter_hardware::{GpioRig, LevelDrive, PulseDrive, StopPulse};
    use shutter_traits::MonotonicClock;
    use std::time::Duration;

    if trace.is_some() {
        eyre::bail!("--trace replays into the simulator and cannot be used with hardware");
    }
    let p = &cfg.pins;
    let rig = GpioRig::open(
        p.open_drive,
        p.close_drive,
        p.trigger,
        p.echo,
        Duration::from_micros(cfg.ranging.trigger_us),
    )
    .wrap_err("open hardware")?;
    let actuator: Box<dyn Actuator + Send> = match cfg.motion.drive {
        DriveStyle::Level => Box::new(
            LevelDrive::new(rig.open, rig.close)
                .map_err(|e| eyre::eyre!("init drive lines: {e}"))?,
        ),
        DriveStyle::Pulse => {
            let stop = match cfg.motion.stop_pulse {
                StopLine::Open => StopPulse::Open,
                StopLine::Close => StopPulse::Close,
                StopLine::None => StopPulse::None,
            };
            Box::new(
                PulseDrive::new(
                    rig.open,
                    rig.close,
                    Duration::from_millis(cfg.motion.pulse_ms),
                    stop,
                    MonotonicClock::new(),
                )
                .map_err(|e| eyre::eyre!("init drive lines: {e}"))?,
            )
        }
    };
    tracing::info!(drive = ?cfg.motion.drive, "hardware backend");
    Ok((actuator, Box::new(rig.ranger)))
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn sim_parts(cfg: &Config, trace: Option<&Path>) -> eyre::Result<Parts> {
    use shutter_hardware::{SimRig, TraceSensor};

    let s = &cfg.sim;
    let rig = SimRig::new(s.open_stop_cm, s.closed_stop_cm, s.start_cm, s.step_cm);
    // Test hook: a ranger that never answers
    if std::env::var("SHUTTER_TEST_SIM_SILENT").is_ok_and(|v| v == "1") {
        rig.set_silent(true);
    }
    let sensor: Box<dyn DistanceSensor + Send> = match trace {
        Some(path) => {
            let samples = shutter_config::load_trace_csv(path)?;
            tracing::info!(samples = samples.len(), "replaying distance trace");
            Box::new(TraceSensor::new(samples))
        }
        None => Box::new(rig.sensor()),
    };
    tracing::info!(
        open_stop_cm = s.open_stop_cm,
        closed_stop_cm = s.closed_stop_cm,
        "simulation backend"
    );
    Ok((Box::new(rig.actuator()), sensor))
}

/// Real GPIO when built with `hardware` on Linux, the simulator otherwise.
fn parts(cfg: &Config, trace: Option<&Path>) -> eyre::Result<Parts> {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        hardware_parts(cfg, trace)
    }
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        sim_parts(cfg, trace)
    }
}

/// Map the typed config onto the core and wire in hardware (or the simulator).
pub fn assemble(
    cfg: &Config,
    trace: Option<&Path>,
    max_move_ms: Option<u64>,
) -> eyre::Result<Shutter> {
    let mut motion = MotionCfg::from(&cfg.motion);
    if let Some(ms) = max_move_ms {
        motion.max_move_ms = ms;
    }
    let ranging = RangingCfg::from(&cfg.ranging);
    let calibration = CalibrationCfg::from(&cfg.calibration);
    let _ = LAST_LIMITS.set(CliLimits {
        max_move_ms: motion.max_move_ms,
        max_seek_ms: calibration.max_seek_ms,
        echo_timeout_ms: ranging.echo_timeout_ms,
    });

    let (actuator, sensor) = parts(cfg, trace)?;
    let builder = Shutter::builder()
        .with_motion(motion)
        .with_ranging(ranging)
        .with_calibration_cfg(calibration);
    let builder = match cfg.storage.path.as_deref() {
        Some(path) => {
            let store = TomlFileStore::new(path);
            tracing::debug!(path = %store.path().display(), "calibration store");
            builder.with_store(store)
        }
        None => builder,
    };
    builder.with_actuator(actuator).with_sensor(sensor).build()
}

/// What a command ended with, for printing.
#[derive(Debug)]
pub struct RunReport {
    pub command: &'static str,
    pub outcome: Option<Outcome>,
    pub position: Option<u16>,
    pub distance_cm: Option<f32>,
    pub endpoints: CalibrationEndpoints,
    pub duration_ms: u64,
}

fn percent(p: Option<u16>) -> String {
    match p {
        Some(p) => format!("{:.2}%", f32::from(p) / 100.0),
        None => "unknown".to_string(),
    }
}

impl RunReport {
    pub fn human(&self) -> String {
        let ep = &self.endpoints;
        match (&self.outcome, self.command) {
            (Some(Outcome::TargetReached { position }), _) => {
                format!("target reached: position {}", percent(Some(*position)))
            }
            (Some(Outcome::EndOfTravel { position }), _) => {
                format!("end of travel: position {}", percent(*position))
            }
            (Some(Outcome::Calibrated { endpoints, persisted }), _) => format!(
                "calibration complete: open {:.1} cm, closed {:.1} cm ({})",
                endpoints.open_distance_cm,
                endpoints.closed_distance_cm,
                if *persisted { "saved" } else { "not saved" }
            ),
            (Some(Outcome::Stopped), _) => "stopped".to_string(),
            (None, "self-check") => format!(
                "self-check ok: distance {:.1} cm, calibration open {:.1} cm / closed {:.1} cm",
                self.distance_cm.unwrap_or_default(),
                ep.open_distance_cm,
                ep.closed_distance_cm
            ),
            (None, _) => match self.distance_cm {
                Some(cm) => format!("position {} (distance {cm:.1} cm)", percent(self.position)),
                None => format!("position {}", percent(self.position)),
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let persisted = match &self.outcome {
            Some(Outcome::Calibrated { persisted, .. }) => Some(*persisted),
            _ => None,
        };
        json!({
            "timestamp": timestamp,
            "command": self.command,
            "outcome": self.outcome.as_ref().map(Outcome::name),
            "position": self.position,
            "distance_cm": self.distance_cm,
            "open_cm": self.endpoints.open_distance_cm,
            "closed_cm": self.endpoints.closed_distance_cm,
            "persisted": persisted,
            "duration_ms": self.duration_ms,
        })
    }
}

fn command_name(cmd: &Commands) -> &'static str {
    match cmd {
        Commands::Move { .. } => "move",
        Commands::Open { .. } => "open",
        Commands::Close { .. } => "close",
        Commands::Stop => "stop",
        Commands::Calibrate => "calibrate",
        Commands::Position => "position",
        Commands::SelfCheck => "self-check",
    }
}

/// Run one command to completion. Ctrl-C stops the motor and resolves the
/// running command as `Stopped`.
pub fn execute(cfg: &Config, trace: Option<&Path>, cmd: &Commands) -> eyre::Result<RunReport> {
    let max_move_ms = match cmd {
        Commands::Move { max_move_ms, .. }
        | Commands::Open { max_move_ms }
        | Commands::Close { max_move_ms } => *max_move_ms,
        _ => None,
    };
    let shutter = assemble(cfg, trace, max_move_ms)?;
    let svc = Arc::new(ShutterService::new(shutter));

    let weak = Arc::downgrade(&svc);
    if let Err(e) = ctrlc::set_handler(move || {
        if let Some(svc) = weak.upgrade()
            && let Err(e) = svc.on_stop_command()
        {
            tracing::error!(error = %e, "stop on interrupt failed");
        }
    }) {
        tracing::warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let command = command_name(cmd);
    let start = Instant::now();
    tracing::info!(command, "command start");
    let outcome = match cmd {
        Commands::Move { target, .. } => Some(
            svc.on_target_command(*target)
                .wrap_err_with(|| format!("move to {target}"))?
                .wait()?,
        ),
        Commands::Open { .. } => Some(svc.on_movement_command(Direction::Open, None)?.wait()?),
        Commands::Close { .. } => Some(svc.on_movement_command(Direction::Close, None)?.wait()?),
        Commands::Stop => {
            svc.on_stop_command()?;
            Some(Outcome::Stopped)
        }
        Commands::Calibrate => Some(svc.on_calibration_command()?.wait()?),
        Commands::Position | Commands::SelfCheck => {
            let sample = svc.with_core(|core| core.measure_now())??;
            if sample.is_none() {
                return Err(eyre::Report::new(ShutterError::Abort(AbortReason::NoSignal)))
                    .wrap_err("measure distance");
            }
            if matches!(cmd, Commands::SelfCheck) {
                let endpoints = svc.with_core(|core| core.endpoints())?;
                endpoints
                    .check()
                    .map_err(|e| eyre::Report::new(ShutterError::InvalidPosition(e)))?;
            }
            None
        }
    };

    let (endpoints, distance_cm) =
        svc.with_core(|core| (core.endpoints(), core.last_distance_cm()))?;
    let report = RunReport {
        command,
        outcome,
        position: svc.current_position(),
        distance_cm,
        endpoints,
        duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    tracing::info!(
        command,
        outcome = report.outcome.as_ref().map(Outcome::name),
        position = report.position,
        duration_ms = report.duration_ms,
        "command complete"
    );
    Ok(report)
}
