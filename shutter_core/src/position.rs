//! Distance to percent-position mapping.
//!
//! Positions are hundredths of a percent in `[0, 10000]`. Under the default
//! [`PositionConvention::ClosedIsFull`] 0 is the open endpoint and 10000
//! the closed endpoint (window-covering lift semantics).

use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

/// Full travel in hundredths of a percent.
pub const FULL_SCALE: u16 = 10_000;

const UNKNOWN: u32 = u32::MAX;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PositionError {
    #[error("open and closed endpoints coincide")]
    DegenerateCalibration,
    #[error("non-finite distance or endpoint")]
    NonFinite,
}

/// Distances measured at the two mechanical ends of travel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationEndpoints {
    pub open_distance_cm: f32,
    pub closed_distance_cm: f32,
}

impl Default for CalibrationEndpoints {
    fn default() -> Self {
        Self {
            open_distance_cm: 10.0,
            closed_distance_cm: 100.0,
        }
    }
}

impl CalibrationEndpoints {
    pub fn new(open_distance_cm: f32, closed_distance_cm: f32) -> Self {
        Self {
            open_distance_cm,
            closed_distance_cm,
        }
    }

    /// Signed travel from the open to the closed endpoint.
    #[inline]
    pub fn span_cm(&self) -> f32 {
        self.closed_distance_cm - self.open_distance_cm
    }

    pub fn check(&self) -> Result<(), PositionError> {
        if !(self.open_distance_cm.is_finite() && self.closed_distance_cm.is_finite()) {
            return Err(PositionError::NonFinite);
        }
        if self.span_cm() == 0.0 {
            return Err(PositionError::DegenerateCalibration);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionConvention {
    #[default]
    ClosedIsFull,
    OpenIsFull,
}

impl PositionConvention {
    /// Convert between "fraction closed" and reported percent. Self-inverse.
    #[inline]
    fn orient(self, p: u16) -> u16 {
        match self {
            PositionConvention::ClosedIsFull => p,
            PositionConvention::OpenIsFull => FULL_SCALE - p,
        }
    }
}

/// `clamp(round((d - open) / (closed - open) * 10000), 0, 10000)`, mirrored
/// under [`PositionConvention::OpenIsFull`].
pub fn percent_for_distance(
    distance_cm: f32,
    endpoints: &CalibrationEndpoints,
    convention: PositionConvention,
) -> Result<u16, PositionError> {
    endpoints.check()?;
    if !distance_cm.is_finite() {
        return Err(PositionError::NonFinite);
    }
    let ratio = (distance_cm - endpoints.open_distance_cm) / endpoints.span_cm();
    let scaled = (ratio * f32::from(FULL_SCALE))
        .round()
        .clamp(0.0, f32::from(FULL_SCALE));
    Ok(convention.orient(scaled as u16))
}

/// Inverse of [`percent_for_distance`] for in-range percentages.
pub fn distance_for_percent(
    percent100ths: u16,
    endpoints: &CalibrationEndpoints,
    convention: PositionConvention,
) -> Result<f32, PositionError> {
    endpoints.check()?;
    let closed_frac = f32::from(convention.orient(percent100ths.min(FULL_SCALE)));
    Ok(endpoints.open_distance_cm + endpoints.span_cm() * closed_frac / f32::from(FULL_SCALE))
}

/// Endpoints plus convention, the state the controller estimates against.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PositionEstimator {
    pub endpoints: CalibrationEndpoints,
    pub convention: PositionConvention,
}

impl PositionEstimator {
    pub fn new(endpoints: CalibrationEndpoints, convention: PositionConvention) -> Self {
        Self {
            endpoints,
            convention,
        }
    }

    #[inline]
    pub fn estimate(&self, distance_cm: f32) -> Result<u16, PositionError> {
        percent_for_distance(distance_cm, &self.endpoints, self.convention)
    }

    #[inline]
    pub fn distance_for(&self, percent100ths: u16) -> Result<f32, PositionError> {
        distance_for_percent(percent100ths, &self.endpoints, self.convention)
    }

    /// How far toward the closed endpoint `percent100ths` lies, whatever the
    /// convention. Used to pick a travel direction.
    #[inline]
    pub fn closedness(&self, percent100ths: u16) -> u16 {
        self.convention.orient(percent100ths.min(FULL_SCALE))
    }
}

/// Latest published position, readable from any thread without locking.
#[derive(Debug)]
pub struct SharedPosition(AtomicU32);

impl Default for SharedPosition {
    fn default() -> Self {
        Self(AtomicU32::new(UNKNOWN))
    }
}

impl SharedPosition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, position: Option<u16>) {
        let v = position.map_or(UNKNOWN, u32::from);
        self.0.store(v, Ordering::Release);
    }

    pub fn load(&self) -> Option<u16> {
        match self.0.load(Ordering::Acquire) {
            UNKNOWN => None,
            v => u16::try_from(v).ok(),
        }
    }
}
