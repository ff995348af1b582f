use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use eyre::WrapErr;
use shutter_config::Logging;

mod cli;
mod error_fmt;
mod run;

use cli::{Cli, FILE_GUARD, JSON_MODE};
use error_fmt::{exit_code_for_error, format_error_json, humanize};

fn init_tracing(json: bool, level: &str, logging: &Logging) -> eyre::Result<()> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

    // RUST_LOG wins over --log-level
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file {path:?} has no file name"))?;
            let rotation = match logging.rotation.as_deref() {
                Some("daily") => Rotation::DAILY,
                Some("hourly") => Rotation::HOURLY,
                _ => Rotation::NEVER,
            };
            let (writer, guard) =
                tracing_appender::non_blocking(RollingFileAppender::new(rotation, dir, name));
            let _ = FILE_GUARD.set(guard);
            let file_filter = EnvFilter::new(logging.level.as_deref().unwrap_or("info"));
            Some(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_filter(file_filter)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| eyre::eyre!("init logging: {e}"))
}

fn load_config(path: &Path) -> eyre::Result<shutter_config::Config> {
    let text =
        fs::read_to_string(path).wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = shutter_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

fn try_main(cli: &Cli) -> eyre::Result<run::RunReport> {
    let cfg = load_config(&cli.config)?;
    init_tracing(cli.json, &cli.log_level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");
    run::execute(&cfg, cli.trace.as_deref(), &cli.cmd)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error hooks: {e}");
    }

    match try_main(&cli) {
        Ok(report) => {
            if cli.json {
                println!("{}", report.to_json());
            } else {
                println!("{}", report.human());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                println!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            ExitCode::from(u8::try_from(exit_code_for_error(&e)).unwrap_or(1))
        }
    }
}
