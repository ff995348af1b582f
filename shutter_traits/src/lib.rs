pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::time::Duration;

/// Error type returned across every hardware trait boundary.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Direction of shutter travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Open,
    Close,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::Open => Direction::Close,
            Direction::Close => Direction::Open,
        }
    }
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Direction::Open => f.write_str("open"),
            Direction::Close => f.write_str("close"),
        }
    }
}

/// A single digital output (relay coil, trigger pin, ...).
pub trait OutputLine {
    fn set_high(&mut self) -> HwResult<()>;
    fn set_low(&mut self) -> HwResult<()>;
}

/// The motor drive: energize toward a direction, or halt.
///
/// Implementations must leave every output line low once `halt` returns.
pub trait Actuator {
    fn drive(&mut self, direction: Direction) -> HwResult<()>;
    fn halt(&mut self) -> HwResult<()>;
}

/// A ranging sensor that yields distances in centimeters.
///
/// `Ok(None)` means no new sample arrived before `timeout`; it is not a fault.
pub trait DistanceSensor {
    fn measure(&mut self, timeout: Duration) -> HwResult<Option<f32>>;
}

/// Minimal persistent key-value interface.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> HwResult<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> HwResult<()>;

    /// Write several keys together. Stores that can commit them in one
    /// step should override this; the default writes them one by one.
    fn set_many(&mut self, entries: &[(&str, &str)]) -> HwResult<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

impl<T: OutputLine + ?Sized> OutputLine for Box<T> {
    fn set_high(&mut self) -> HwResult<()> {
        (**self).set_high()
    }
    fn set_low(&mut self) -> HwResult<()> {
        (**self).set_low()
    }
}

impl<T: Actuator + ?Sized> Actuator for Box<T> {
    fn drive(&mut self, direction: Direction) -> HwResult<()> {
        (**self).drive(direction)
    }
    fn halt(&mut self) -> HwResult<()> {
        (**self).halt()
    }
}

impl<T: DistanceSensor + ?Sized> DistanceSensor for Box<T> {
    fn measure(&mut self, timeout: Duration) -> HwResult<Option<f32>> {
        (**self).measure(timeout)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get(&self, key: &str) -> HwResult<Option<String>> {
        (**self).get(key)
    }
    fn set(&mut self, key: &str, value: &str) -> HwResult<()> {
        (**self).set(key, value)
    }
    fn set_many(&mut self, entries: &[(&str, &str)]) -> HwResult<()> {
        (**self).set_many(entries)
    }
}
