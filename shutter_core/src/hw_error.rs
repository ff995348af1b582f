//! Maps `Box<dyn Error>` from trait boundaries to typed `ShutterError`.
//!
//! The traits in `shutter_traits` use `Box<dyn Error + Send + Sync>`; errors
//! raised by `shutter_hardware` are downcast for a precise mapping, anything
//! else falls back to string heuristics.

use shutter_hardware::error::HwError;

use crate::error::ShutterError;

/// Map a trait-boundary error to a typed `ShutterError`.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ShutterError {
    if let Some(hw) = e.downcast_ref::<HwError>() {
        return match hw {
            HwError::Timeout => ShutterError::Timeout,
            HwError::Io(io) => ShutterError::Io(io.to_string()),
            other => ShutterError::HardwareFault(other.to_string()),
        };
    }
    if let Some(io) = e.downcast_ref::<std::io::Error>() {
        return ShutterError::Io(io.to_string());
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        ShutterError::Timeout
    } else {
        ShutterError::Hardware(s)
    }
}
