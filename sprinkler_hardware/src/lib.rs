//! Hardware backends for the sprinkler head.
//!
//! The Raspberry Pi drivers (`rppal`) are compiled only with the `hardware`
//! feature. The [`sim`] rig is always available and is what the CLI and the
//! test suites drive by default.

pub mod error;
pub mod sim;

#[cfg(feature = "hardware")]
pub mod i2c;
#[cfg(feature = "hardware")]
pub mod motor;

pub use error::HwError;
pub use sim::{SimBus, SimMotorPins, SimRig};

#[cfg(feature = "hardware")]
pub use i2c::RppalI2cBus;
#[cfg(feature = "hardware")]
pub use motor::PwmMotorPins;
