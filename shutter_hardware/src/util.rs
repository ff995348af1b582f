use std::time::Duration;

use shutter_traits::Clock;

use crate::error::{HwError, Result};

/// Poll `ready` until it returns true or `timeout` expires on `clock`.
/// Sleeps `poll_interval` between checks to avoid CPU spinning.
pub fn wait_until_with_timeout(
    mut ready: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
    clock: &dyn Clock,
) -> Result<()> {
    let start = clock.now();
    let budget_us = timeout.as_micros().min(u128::from(u64::MAX)) as u64;
    while !ready() {
        if clock.us_since(start) >= budget_us {
            return Err(HwError::Timeout);
        }
        clock.sleep(poll_interval);
    }
    Ok(())
}
