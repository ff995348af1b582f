//! rppal wiring for the drive relays and the HC-SR04 ranger.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};
use shutter_traits::{DistanceSensor, HwResult, MonotonicClock, OutputLine};

use crate::echo::{DistanceCell, EchoDecoder, EchoRanger};
use crate::error::{HwError, Result};

/// A GPIO output pin as a drive or trigger line.
pub struct GpioLine(OutputPin);

impl GpioLine {
    pub fn open(gpio: &Gpio, pin: u8) -> Result<Self> {
        let p = gpio
            .get(pin)
            .map_err(|e| HwError::Gpio(format!("open pin {pin}: {e}")))?
            .into_output_low();
        Ok(Self(p))
    }
}

impl OutputLine for GpioLine {
    fn set_high(&mut self) -> HwResult<()> {
        self.0.set_high();
        Ok(())
    }
    fn set_low(&mut self) -> HwResult<()> {
        self.0.set_low();
        Ok(())
    }
}

/// HC-SR04 on a trigger output and an interrupt-capable echo input.
pub struct Hcsr04 {
    // Keeps the async interrupt registered for the lifetime of the sensor.
    _echo: InputPin,
    ranger: EchoRanger<GpioLine, MonotonicClock>,
}

impl Hcsr04 {
    pub fn new(gpio: &Gpio, trigger_pin: u8, echo_pin: u8, trigger_pulse: Duration) -> Result<Self> {
        let trigger = GpioLine::open(gpio, trigger_pin)?;
        let mut echo = gpio
            .get(echo_pin)
            .map_err(|e| HwError::Gpio(format!("open pin {echo_pin}: {e}")))?
            .into_input();

        let cell = Arc::new(DistanceCell::new());
        let decoder = Arc::new(EchoDecoder::new(cell.clone()));
        let epoch = Instant::now();
        let edge = decoder.clone();
        echo.set_async_interrupt(Trigger::Both, move |level: Level| {
            let at_us = epoch.elapsed().as_micros().min(u128::from(u64::MAX)) as u64;
            edge.on_edge(level == Level::High, at_us);
        })
        .map_err(|e| HwError::Gpio(format!("echo interrupt on pin {echo_pin}: {e}")))?;

        tracing::info!(trigger_pin, echo_pin, "hc-sr04 ready");
        Ok(Self {
            _echo: echo,
            ranger: EchoRanger::new(trigger, cell, MonotonicClock::new()).with_pulse(trigger_pulse),
        })
    }
}

impl DistanceSensor for Hcsr04 {
    fn measure(&mut self, timeout: Duration) -> HwResult<Option<f32>> {
        self.ranger.measure(timeout)
    }
}

/// Both drive lines and the ranger, opened from one GPIO handle.
pub struct GpioRig {
    pub open: GpioLine,
    pub close: GpioLine,
    pub ranger: Hcsr04,
}

impl GpioRig {
    pub fn open(
        open_pin: u8,
        close_pin: u8,
        trigger_pin: u8,
        echo_pin: u8,
        trigger_pulse: Duration,
    ) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(format!("open gpio: {e}")))?;
        Ok(Self {
            open: GpioLine::open(&gpio, open_pin)?,
            close: GpioLine::open(&gpio, close_pin)?,
            ranger: Hcsr04::new(&gpio, trigger_pin, echo_pin, trigger_pulse)?,
        })
    }
}
