//! Human-readable error descriptions and structured JSON error formatting.

use shutter_core::error::{AbortReason, BuildError, ShutterError};
use shutter_core::PositionError;

use crate::cli::LAST_LIMITS;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingActuator => {
                "What happened: No motor drive was provided to the controller.\nLikely causes: The drive relays failed to initialize or were not wired into the builder.\nHow to fix: Ensure the drive lines are created successfully and passed via with_actuator(...).".to_string()
            }
            BuildError::MissingSensor => {
                "What happened: No distance sensor was provided to the controller.\nLikely causes: The ranger failed to initialize or was not wired into the builder.\nHow to fix: Ensure the ranger is created successfully and passed via with_sensor(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/shutter.toml for a sample."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<ShutterError>() {
        match se {
            ShutterError::Timeout => {
                return "What happened: The ranger did not answer in time.\nLikely causes: Echo line not wired, sensor unpowered, or ranging.echo_timeout_ms too low.\nHow to fix: Check the trigger/echo pins and 5V/GND, and consider raising ranging.echo_timeout_ms.".to_string();
            }
            ShutterError::Abort(reason) => {
                return match reason {
                    AbortReason::MaxRuntime => "What happened: max run time was exceeded; the motor was halted.\nLikely causes: Target never reached, slipping belt, or ranger reading the wrong surface.\nHow to fix: Check the mechanics and ranger aim; raise motion.max_move_ms (or --max-move-ms) if the door is just slow.".to_string(),
                    AbortReason::StallTimeout => "What happened: Calibration found no end of travel before the seek timeout; the motor was halted.\nLikely causes: Readings never settle (vibration, obstacle in the beam) or the door travels slower than expected.\nHow to fix: Stabilize the ranger mount, or raise calibration.max_seek_ms / calibration.stall_delta_cm.".to_string(),
                    AbortReason::DegenerateCalibration => "What happened: Calibration measured the same distance at both ends; the previous calibration was kept.\nLikely causes: The motor did not move the door, or the ranger does not see the door.\nHow to fix: Check the drive relays and the ranger aim, then run `shutter calibrate` again.".to_string(),
                    AbortReason::NoSignal => "What happened: No distance sample was available.\nLikely causes: Echo line disconnected, nothing in range (0-400 cm), or ranger unpowered.\nHow to fix: Check the echo pin and wiring, then retry.".to_string(),
                };
            }
            ShutterError::InvalidPosition(PositionError::DegenerateCalibration) => {
                return "What happened: The stored calibration cannot map distances to positions.\nLikely causes: Open and closed endpoints are equal (never calibrated, or a bad stored value).\nHow to fix: Run `shutter calibrate`, or use `shutter open` / `shutter close`.".to_string();
            }
            ShutterError::Busy(kind) => {
                return format!(
                    "What happened: A {kind} is already in progress.\nLikely causes: Another command is still running.\nHow to fix: Wait for it to finish or run `shutter stop`."
                );
            }
            _ => {}
        }
        // Fallback to generic for other domain errors
        return format!(
            "What happened: {se}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open pin") || lower.contains("echo interrupt") {
        return "What happened: Failed to initialize GPIO pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO.".to_string();
    }

    if lower.contains("pins must be distinct")
        || lower.contains("missing field")
        || lower.contains("must be")
    {
        return format!(
            "What happened: Configuration is invalid or incomplete ({msg}).\nLikely causes: Missing [pins] (open_drive, close_drive, trigger, echo), or out-of-range values.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Trace CSV header special-case
    if lower.contains("trace csv must have headers") {
        return "Invalid headers in trace CSV. Expected 'tick,distance_cm'.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// The abort reason behind a report, if any.
pub fn abort_reason_of(err: &eyre::Report) -> Option<AbortReason> {
    match err.downcast_ref::<ShutterError>() {
        Some(ShutterError::Abort(reason)) => Some(*reason),
        _ => None,
    }
}

/// Map AbortReason (if present) to stable exit codes; other errors return 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match abort_reason_of(err) {
        Some(AbortReason::StallTimeout) => 3,
        Some(AbortReason::MaxRuntime) => 4,
        Some(AbortReason::DegenerateCalibration) => 5,
        Some(AbortReason::NoSignal) => 6,
        None => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    if let Some(reason) = abort_reason_of(err) {
        let msg = humanize(err);
        let limits = LAST_LIMITS.get();
        let detail_obj = match reason {
            AbortReason::MaxRuntime => limits.map(|l| json!({ "max_move_ms": l.max_move_ms })),
            AbortReason::StallTimeout => limits.map(|l| json!({ "max_seek_ms": l.max_seek_ms })),
            AbortReason::NoSignal => {
                limits.map(|l| json!({ "echo_timeout_ms": l.echo_timeout_ms }))
            }
            AbortReason::DegenerateCalibration => None,
        };

        let obj = if let Some(d) = detail_obj {
            json!({ "reason": reason.name(), "details": d, "message": msg })
        } else {
            json!({ "reason": reason.name(), "message": msg })
        };
        return obj.to_string();
    }

    // Generic error JSON
    json!({ "reason": "Error", "message": humanize(err) }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_reasons_have_distinct_exit_codes() {
        let codes: Vec<i32> = [
            AbortReason::MaxRuntime,
            AbortReason::StallTimeout,
            AbortReason::DegenerateCalibration,
            AbortReason::NoSignal,
        ]
        .into_iter()
        .map(|r| exit_code_for_error(&eyre::Report::new(ShutterError::Abort(r))))
        .collect();
        assert_eq!(codes, vec![4, 3, 5, 6]);
        assert_eq!(exit_code_for_error(&eyre::eyre!("boom")), 1);
    }

    #[test]
    fn wrapped_abort_keeps_its_reason() {
        use eyre::WrapErr;
        let err: eyre::Result<()> =
            Err(eyre::Report::new(ShutterError::Abort(AbortReason::NoSignal)));
        let err = err.wrap_err("move").unwrap_err();
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "NoSignal");
        assert!(v["message"].as_str().unwrap().contains("No distance sample"));
    }
}
