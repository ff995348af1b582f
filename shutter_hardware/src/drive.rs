//! Actuator adapters over the two motor-drive output lines.
//!
//! - [`LevelDrive`] holds the direction line high for the whole motion.
//! - [`PulseDrive`] emits a fixed-width pulse that the downstream relay
//!   latches like a wall-button press; the motor then runs until it stalls
//!   mechanically or another press stops it.

use std::time::Duration;

use shutter_traits::{Actuator, Clock, Direction, HwResult, OutputLine};
use tracing::debug;

/// Which line, if any, is pulsed to stop a pulse-driven motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopPulse {
    #[default]
    Open,
    Close,
    None,
}

/// Level-held drive.
pub struct LevelDrive<L: OutputLine> {
    open: L,
    close: L,
}

impl<L: OutputLine> LevelDrive<L> {
    /// Takes ownership of both lines and forces them low.
    pub fn new(mut open: L, mut close: L) -> HwResult<Self> {
        open.set_low()?;
        close.set_low()?;
        Ok(Self { open, close })
    }
}

impl<L: OutputLine> Actuator for LevelDrive<L> {
    fn drive(&mut self, direction: Direction) -> HwResult<()> {
        // Release the opposite line first so both are never high together.
        match direction {
            Direction::Open => {
                self.close.set_low()?;
                self.open.set_high()
            }
            Direction::Close => {
                self.open.set_low()?;
                self.close.set_high()
            }
        }
    }

    fn halt(&mut self) -> HwResult<()> {
        let a = self.open.set_low();
        let b = self.close.set_low();
        a.and(b)
    }
}

/// Momentary-pulse drive.
pub struct PulseDrive<L: OutputLine, C: Clock> {
    open: L,
    close: L,
    pulse: Duration,
    stop: StopPulse,
    clock: C,
}

impl<L: OutputLine, C: Clock> PulseDrive<L, C> {
    pub fn new(
        mut open: L,
        mut close: L,
        pulse: Duration,
        stop: StopPulse,
        clock: C,
    ) -> HwResult<Self> {
        open.set_low()?;
        close.set_low()?;
        Ok(Self {
            open,
            close,
            pulse,
            stop,
            clock,
        })
    }

    fn press(line: &mut L, pulse: Duration, clock: &C) -> HwResult<()> {
        if let Err(e) = line.set_high() {
            let _ = line.set_low();
            return Err(e);
        }
        clock.sleep(pulse);
        line.set_low()
    }
}

impl<L: OutputLine, C: Clock> Actuator for PulseDrive<L, C> {
    fn drive(&mut self, direction: Direction) -> HwResult<()> {
        debug!(%direction, pulse_ms = self.pulse.as_millis() as u64, "drive pulse");
        match direction {
            Direction::Open => Self::press(&mut self.open, self.pulse, &self.clock),
            Direction::Close => Self::press(&mut self.close, self.pulse, &self.clock),
        }
    }

    fn halt(&mut self) -> HwResult<()> {
        match self.stop {
            StopPulse::Open => Self::press(&mut self.open, self.pulse, &self.clock),
            StopPulse::Close => Self::press(&mut self.close, self.pulse, &self.clock),
            StopPulse::None => {
                let a = self.open.set_low();
                let b = self.close.set_low();
                a.and(b)
            }
        }
    }
}
