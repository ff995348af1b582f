//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();
/// Effective watchdog limits for the current run (for JSON details).
pub static LAST_LIMITS: OnceLock<CliLimits> = OnceLock::new();

#[derive(Copy, Clone, Debug)]
pub struct CliLimits {
    pub max_move_ms: u64,
    pub max_seek_ms: u64,
    pub echo_timeout_ms: u64,
}

#[derive(Parser, Debug)]
#[command(name = "shutter", version, about = "Garage shutter controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/shutter.toml")]
    pub config: PathBuf,

    /// Replay a recorded distance trace (tick,distance_cm) instead of the simulated ranger
    #[arg(long, value_name = "FILE")]
    pub trace: Option<PathBuf>,

    /// Log as JSON lines and print results as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Move to a position in hundredths of a percent (0..=10000)
    Move {
        #[arg(long, value_parser = clap::value_parser!(u16).range(0..=10_000))]
        target: u16,
        /// Override the movement watchdog (ms)
        #[arg(long, value_name = "MS")]
        max_move_ms: Option<u64>,
    },
    /// Open until the end of travel
    Open {
        #[arg(long, value_name = "MS")]
        max_move_ms: Option<u64>,
    },
    /// Close until the end of travel
    Close {
        #[arg(long, value_name = "MS")]
        max_move_ms: Option<u64>,
    },
    /// De-energize both drive lines.
    ///
    /// Each invocation starts idle, so this only acts through drive setup:
    /// level drive pulls both lines low, while pulse drive sends no stop
    /// pulse and cannot halt a relay latched by another process.
    Stop,
    /// Measure both endpoints and store them
    Calibrate,
    /// Take one reading and print the position
    Position,
    /// Quick health check (ranger answers, calibration usable)
    SelfCheck,
}
