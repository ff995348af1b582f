#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and trace parsing for the shutter controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Distance-trace CSV loader enforces headers; traces feed the simulator.
use serde::Deserialize;

/// Distance-trace CSV schema.
///
/// Expected headers:
/// tick,distance_cm
///
/// Example:
/// tick,distance_cm
/// 0,55.2
/// 1,54.8
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct TraceRow {
    pub tick: u64,
    pub distance_cm: f32,
}

#[derive(Debug, Deserialize)]
pub struct Pins {
    pub open_drive: u8,
    pub close_drive: u8,
    pub trigger: u8,
    pub echo: u8,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DriveStyle {
    #[default]
    Level,
    Pulse,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StopLine {
    #[default]
    Open,
    Close,
    None,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Convention {
    /// 0 at the open endpoint, 10000 at the closed endpoint.
    #[default]
    ClosedIsFull,
    /// 10000 at the open endpoint, 0 at the closed endpoint.
    OpenIsFull,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotionCfg {
    /// Control-loop tick (ms)
    pub tick_ms: u64,
    /// Target reached when |target - position| < tolerance (hundredths of a percent)
    pub tolerance_100ths: u16,
    /// Hard cap on a single movement (ms)
    pub max_move_ms: u64,
    pub drive: DriveStyle,
    /// Pulse width for `drive = "pulse"` (ms)
    pub pulse_ms: u64,
    /// Which line is pulsed to stop a pulse-driven motor
    pub stop_pulse: StopLine,
    pub convention: Convention,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            tolerance_100ths: 500,
            max_move_ms: 60_000,
            drive: DriveStyle::Level,
            pulse_ms: 100,
            stop_pulse: StopLine::Open,
            convention: Convention::ClosedIsFull,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RangingCfg {
    /// Trigger pulse width (µs)
    pub trigger_us: u64,
    /// Max wait for an echo per measurement (ms). Also accepts alias "timeout_ms".
    #[serde(alias = "timeout_ms")]
    pub echo_timeout_ms: u64,
}

impl Default for RangingCfg {
    fn default() -> Self {
        Self {
            trigger_us: 10,
            echo_timeout_ms: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Readings closer than this count as "not moving" (cm)
    pub stall_delta_cm: f32,
    /// End of travel once the stable counter exceeds this many ticks
    pub stall_ticks: u32,
    /// Samples averaged into a stable measurement
    pub settle_samples: u32,
    /// Hard cap on each seek phase (ms)
    pub max_seek_ms: u64,
    /// Open endpoint used until a calibration is stored (cm)
    pub default_open_cm: f32,
    /// Closed endpoint used until a calibration is stored (cm)
    pub default_closed_cm: f32,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            stall_delta_cm: 2.0,
            stall_ticks: 20,
            settle_samples: 5,
            max_seek_ms: 120_000,
            default_open_cm: 10.0,
            default_closed_cm: 100.0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Storage {
    /// Key-value file holding persisted calibration. Absent = in-memory only.
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Mechanics of the simulated rig used when built without `hardware`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimCfg {
    pub open_stop_cm: f32,
    pub closed_stop_cm: f32,
    pub start_cm: f32,
    /// Travel per tick while the motor runs (cm)
    pub step_cm: f32,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            open_stop_cm: 12.0,
            closed_stop_cm: 180.0,
            start_cm: 60.0,
            step_cm: 4.0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub motion: MotionCfg,
    #[serde(default)]
    pub ranging: RangingCfg,
    #[serde(default)]
    pub calibration: CalibrationCfg,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub sim: SimCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Load a recorded distance trace, returning samples ordered by tick.
pub fn load_trace_csv(path: &std::path::Path) -> eyre::Result<Vec<f32>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open trace CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["tick", "distance_cm"];
    let actual: Vec<String> = headers.iter().map(|s| s.trim().to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "trace CSV must have headers 'tick,distance_cm', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<TraceRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }
    if rows.is_empty() {
        eyre::bail!("trace CSV {:?} has no samples", path);
    }
    for pair in rows.windows(2) {
        if pair[1].tick <= pair[0].tick {
            eyre::bail!(
                "trace ticks must be strictly increasing (tick {} after {})",
                pair[1].tick,
                pair[0].tick
            );
        }
    }
    Ok(rows.into_iter().map(|r| r.distance_cm).collect())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        let p = &self.pins;
        let pins = [p.open_drive, p.close_drive, p.trigger, p.echo];
        for (i, a) in pins.iter().enumerate() {
            if pins[i + 1..].contains(a) {
                eyre::bail!("pins must be distinct (pin {a} used twice)");
            }
        }

        // Motion
        if self.motion.tick_ms == 0 {
            eyre::bail!("motion.tick_ms must be >= 1");
        }
        if self.motion.tick_ms > 10_000 {
            eyre::bail!("motion.tick_ms is unreasonably large (>10s)");
        }
        if self.motion.tolerance_100ths == 0 || self.motion.tolerance_100ths > 5_000 {
            eyre::bail!("motion.tolerance_100ths must be in [1, 5000]");
        }
        if self.motion.max_move_ms < self.motion.tick_ms {
            eyre::bail!("motion.max_move_ms must be >= motion.tick_ms");
        }
        if self.motion.drive == DriveStyle::Pulse && self.motion.pulse_ms == 0 {
            eyre::bail!("motion.pulse_ms must be >= 1 for pulse drive");
        }

        // Ranging
        if self.ranging.trigger_us == 0 {
            eyre::bail!("ranging.trigger_us must be >= 1");
        }
        if self.ranging.echo_timeout_ms == 0 {
            eyre::bail!("ranging.echo_timeout_ms must be >= 1");
        }
        if self.ranging.echo_timeout_ms > self.motion.tick_ms {
            eyre::bail!("ranging.echo_timeout_ms must be <= motion.tick_ms");
        }

        // Calibration
        let c = &self.calibration;
        if !(c.stall_delta_cm.is_finite() && c.stall_delta_cm > 0.0) {
            eyre::bail!("calibration.stall_delta_cm must be > 0");
        }
        if c.stall_ticks == 0 {
            eyre::bail!("calibration.stall_ticks must be >= 1");
        }
        if c.settle_samples == 0 {
            eyre::bail!("calibration.settle_samples must be >= 1");
        }
        if c.max_seek_ms < self.motion.tick_ms {
            eyre::bail!("calibration.max_seek_ms must be >= motion.tick_ms");
        }
        for (name, v) in [
            ("default_open_cm", c.default_open_cm),
            ("default_closed_cm", c.default_closed_cm),
        ] {
            if !(v.is_finite() && v > 0.0 && v < 400.0) {
                eyre::bail!("calibration.{name} must be in (0, 400)");
            }
        }
        if c.default_open_cm == c.default_closed_cm {
            eyre::bail!("calibration.default_open_cm and default_closed_cm must differ");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Sim
        if !(self.sim.step_cm.is_finite() && self.sim.step_cm > 0.0) {
            eyre::bail!("sim.step_cm must be > 0");
        }

        Ok(())
    }
}
