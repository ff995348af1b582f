//! End-of-travel detection and the two-phase calibration sequence.

use shutter_traits::Direction;

/// Declares end of travel once readings stop changing.
///
/// The counter increments while `|sample - last_sampled| < delta_cm` and
/// resets (re-anchoring `last_sampled`) on any larger move. It fires once
/// the counter exceeds `ticks`, i.e. on the `ticks + 1`-th stable sample.
#[derive(Debug, Clone)]
pub struct StallDetector {
    delta_cm: f32,
    ticks: u32,
    last_sampled: Option<f32>,
    count: u32,
}

impl StallDetector {
    pub fn new(delta_cm: f32, ticks: u32) -> Self {
        Self {
            delta_cm,
            ticks,
            last_sampled: None,
            count: 0,
        }
    }

    /// Restart from `anchor`; `None` lets the next sample become the anchor.
    pub fn reset(&mut self, anchor: Option<f32>) {
        self.last_sampled = anchor;
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Feed one accepted sample. Returns true when end of travel is reached.
    pub fn observe(&mut self, cm: f32) -> bool {
        match self.last_sampled {
            Some(last) if (cm - last).abs() < self.delta_cm => {
                self.count = self.count.saturating_add(1);
            }
            _ => {
                self.count = 0;
                self.last_sampled = Some(cm);
            }
        }
        self.count > self.ticks
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Phase {
    /// Motor running toward an end stop, waiting for the stall detector.
    Seek(Direction),
    /// Motor halted at an end stop, collecting samples to average.
    Settle {
        direction: Direction,
        samples: Vec<f32>,
    },
}

/// Progress of one calibration run.
#[derive(Debug, Clone)]
pub(crate) struct CalibrationRun {
    pub(crate) phase: Phase,
    pub(crate) open_cm: Option<f32>,
    /// Start of the current phase (ms since the core epoch).
    pub(crate) phase_started_ms: u64,
}

impl CalibrationRun {
    pub(crate) fn new(now_ms: u64) -> Self {
        Self {
            phase: Phase::Seek(Direction::Open),
            open_cm: None,
            phase_started_ms: now_ms,
        }
    }
}

/// Arithmetic mean; `None` for an empty slice.
pub fn mean_cm(samples: &[f32]) -> Option<f32> {
    if samples.is_empty() {
        return None;
    }
    let sum: f32 = samples.iter().sum();
    Some(sum / samples.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_on_the_sample_after_threshold() {
        let mut s = StallDetector::new(2.0, 20);
        s.reset(Some(50.0));
        for i in 1..=20 {
            assert!(!s.observe(50.5), "fired early at {i}");
        }
        assert!(s.observe(49.8));
        assert_eq!(s.count(), 21);
    }

    #[test]
    fn movement_resets_and_reanchors() {
        let mut s = StallDetector::new(2.0, 3);
        s.reset(None);
        assert!(!s.observe(10.0));
        assert!(!s.observe(11.0));
        assert!(!s.observe(11.5));
        assert_eq!(s.count(), 2);
        // 12.5 is 2.5 from the anchor (10.0): counts as movement
        assert!(!s.observe(12.5));
        assert_eq!(s.count(), 0);
        // slow creep below delta per step still drifts past the anchor
        assert!(!s.observe(13.0));
        assert!(!s.observe(14.0));
        assert!(!s.observe(14.4));
        assert_eq!(s.count(), 3);
        assert!(!s.observe(14.6));
        assert_eq!(s.count(), 0);
    }

    #[test]
    fn mean_of_settle_samples() {
        assert_eq!(mean_cm(&[]), None);
        assert_eq!(mean_cm(&[10.0, 12.0, 14.0, 16.0, 18.0]), Some(14.0));
    }
}
