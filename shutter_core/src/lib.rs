#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Motion core for a garage shutter (hardware-agnostic).
//!
//! All hardware interactions go through `shutter_traits::Actuator` and
//! `shutter_traits::DistanceSensor`; persistence goes through
//! `shutter_traits::KeyValueStore`.
//!
//! ## Architecture
//!
//! - **Position**: distance to percent-position mapping (`position` module)
//! - **Control**: step-driven movement and calibration state machine (`ShutterCore`)
//! - **Calibration**: stall detection and the open/close seek sequence
//! - **Store**: calibration persistence with per-key defaults
//! - **Service**: threaded host interface with stop, events and handles
//! - **Safety**: movement and seek watchdogs that halt before reporting
//!
//! Positions are hundredths of a percent (`u16`, 0..=10000).

pub mod builder;
pub mod calibration;
pub mod config;
pub mod conversions;
pub mod controller;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod position;
pub mod service;
pub mod status;
pub mod store;

pub use builder::{Shutter, ShutterBuilder};
pub use calibration::StallDetector;
pub use config::{CalibrationCfg, MotionCfg, RangingCfg};
pub use controller::{ShutterCore, TargetStart};
pub use error::{AbortReason, BuildError, Result, ShutterError};
pub use position::{
    CalibrationEndpoints, FULL_SCALE, PositionConvention, PositionError, PositionEstimator,
    SharedPosition, distance_for_percent, percent_for_distance,
};
pub use service::{MotionHandle, ShutterEvent, ShutterService};
pub use status::{MotionStatus, OperationKind, Outcome};
pub use store::{CalibrationStore, MemoryStore, TomlFileStore};
