//! Ultrasonic echo ranging (HC-SR04 style).
//!
//! The echo line is decoded by an edge handler that runs in the interrupt
//! context: the rising edge stamps the start of the echo pulse, the falling
//! edge converts its width to centimeters and publishes it to a
//! [`DistanceCell`]. The control loop reads the cell from another thread, so
//! every shared value is an atomic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use shutter_traits::{Clock, DistanceSensor, HwResult, OutputLine};
use tracing::trace;

use crate::error::HwError;
use crate::util::wait_until_with_timeout;

/// Round-trip speed of sound, in cm per µs of echo pulse width.
pub const SPEED_OF_SOUND_CM_PER_US: f32 = 0.017;
/// Exclusive lower bound of a physically plausible reading.
pub const MIN_DISTANCE_CM: f32 = 0.0;
/// Exclusive upper bound of a physically plausible reading.
pub const MAX_DISTANCE_CM: f32 = 400.0;
/// Default trigger pulse width.
pub const TRIGGER_PULSE: Duration = Duration::from_micros(10);

const NO_EDGE: u64 = u64::MAX;

/// True when `cm` lies strictly inside (0, 400) cm.
#[inline]
pub fn in_band(cm: f32) -> bool {
    cm.is_finite() && cm > MIN_DISTANCE_CM && cm < MAX_DISTANCE_CM
}

/// Convert an echo pulse width to a distance, rejecting out-of-band results.
#[inline]
pub fn pulse_width_to_cm(width_us: u64) -> Option<f32> {
    let cm = width_us as f32 * SPEED_OF_SOUND_CM_PER_US;
    in_band(cm).then_some(cm)
}

/// Latest accepted distance, shared between the echo handler and readers.
#[derive(Debug, Default)]
pub struct DistanceCell {
    bits: AtomicU32,
    seq: AtomicU64,
}

impl DistanceCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, cm: f32) {
        self.bits.store(cm.to_bits(), Ordering::Release);
        self.seq.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of samples published so far; readers use it to detect fresh data.
    pub fn sequence(&self) -> u64 {
        self.seq.load(Ordering::Acquire)
    }

    pub fn latest(&self) -> Option<f32> {
        if self.sequence() == 0 {
            return None;
        }
        Some(f32::from_bits(self.bits.load(Ordering::Acquire)))
    }
}

/// Edge handler for the echo line. Sole writer of its [`DistanceCell`].
#[derive(Debug)]
pub struct EchoDecoder {
    rising_us: AtomicU64,
    cell: Arc<DistanceCell>,
}

impl EchoDecoder {
    pub fn new(cell: Arc<DistanceCell>) -> Self {
        Self {
            rising_us: AtomicU64::new(NO_EDGE),
            cell,
        }
    }

    pub fn cell(&self) -> &Arc<DistanceCell> {
        &self.cell
    }

    /// Feed one edge. `high` is the new line level, `at_us` a monotonic
    /// microsecond timestamp. Out-of-band widths are dropped silently.
    pub fn on_edge(&self, high: bool, at_us: u64) {
        if high {
            self.rising_us.store(at_us, Ordering::Release);
            return;
        }
        let rising = self.rising_us.swap(NO_EDGE, Ordering::AcqRel);
        if rising == NO_EDGE || at_us < rising {
            return;
        }
        match pulse_width_to_cm(at_us - rising) {
            Some(cm) => {
                trace!(width_us = at_us - rising, cm, "echo sample");
                self.cell.store(cm);
            }
            None => trace!(width_us = at_us - rising, "echo out of band, dropped"),
        }
    }
}

/// Trigger-and-wait ranger built on an output line and a decoder-fed cell.
pub struct EchoRanger<T: OutputLine, C: Clock> {
    trigger: T,
    cell: Arc<DistanceCell>,
    clock: C,
    pulse: Duration,
    poll: Duration,
}

impl<T: OutputLine, C: Clock> EchoRanger<T, C> {
    pub fn new(trigger: T, cell: Arc<DistanceCell>, clock: C) -> Self {
        Self {
            trigger,
            cell,
            clock,
            pulse: TRIGGER_PULSE,
            poll: Duration::from_micros(500),
        }
    }

    pub fn with_pulse(mut self, pulse: Duration) -> Self {
        self.pulse = pulse;
        self
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll.max(Duration::from_micros(1));
        self
    }

    /// Emit one trigger pulse; the echo arrives asynchronously.
    pub fn trigger(&mut self) -> HwResult<()> {
        self.trigger.set_high()?;
        self.clock.sleep(self.pulse);
        self.trigger.set_low()
    }
}

impl<T: OutputLine, C: Clock> DistanceSensor for EchoRanger<T, C> {
    fn measure(&mut self, timeout: Duration) -> HwResult<Option<f32>> {
        let before = self.cell.sequence();
        self.trigger()?;
        let cell = &self.cell;
        match wait_until_with_timeout(|| cell.sequence() != before, timeout, self.poll, &self.clock)
        {
            Ok(()) => Ok(self.cell.latest()),
            Err(HwError::Timeout) => {
                trace!("no echo before timeout");
                Ok(None)
            }
            Err(e) => Err(Box::new(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_is_exclusive() {
        assert!(!in_band(0.0));
        assert!(!in_band(400.0));
        assert!(!in_band(f32::NAN));
        assert!(in_band(0.1));
        assert!(in_band(399.9));
    }

    #[test]
    fn pulse_width_converts_with_round_trip_factor() {
        let cm = pulse_width_to_cm(1000).expect("in band");
        assert!((cm - 17.0).abs() < 1e-4);
        assert!(pulse_width_to_cm(0).is_none());
        // 400 cm / 0.017 ≈ 23530 µs
        assert!(pulse_width_to_cm(30_000).is_none());
    }

    #[test]
    fn decoder_publishes_only_in_band_pulses() {
        let cell = Arc::new(DistanceCell::new());
        let dec = EchoDecoder::new(cell.clone());
        assert_eq!(cell.latest(), None);

        dec.on_edge(true, 10_000);
        dec.on_edge(false, 13_000);
        let first = cell.latest().expect("sample");
        assert!((first - 51.0).abs() < 1e-3);

        // 40 ms echo is far beyond 400 cm: dropped, previous value kept
        dec.on_edge(true, 20_000);
        dec.on_edge(false, 60_000);
        assert_eq!(cell.latest(), Some(first));
        assert_eq!(cell.sequence(), 1);
    }

    #[test]
    fn falling_edge_without_rising_is_ignored() {
        let cell = Arc::new(DistanceCell::new());
        let dec = EchoDecoder::new(cell.clone());
        dec.on_edge(false, 5_000);
        assert_eq!(cell.sequence(), 0);
        // A consumed rising edge cannot be paired twice
        dec.on_edge(true, 1_000);
        dec.on_edge(false, 2_000);
        dec.on_edge(false, 3_000);
        assert_eq!(cell.sequence(), 1);
    }
}
