//! Hardware side of the shutter: echo ranging, drive adapters, GPIO wiring
//! and a simulated rig for running without a Raspberry Pi.

pub mod drive;
pub mod echo;
pub mod error;
pub mod sim;
pub mod util;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod hcsr04;

pub use drive::{LevelDrive, PulseDrive, StopPulse};
pub use echo::{DistanceCell, EchoDecoder, EchoRanger};
pub use sim::{SimActuator, SimRanger, SimRig, TraceSensor};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use hcsr04::{GpioLine, GpioRig, Hcsr04};
