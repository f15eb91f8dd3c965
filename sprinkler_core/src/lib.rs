#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Sprinkler head control (hardware-agnostic).
//!
//! All hardware access goes through `sprinkler_traits::I2cBus` and
//! `sprinkler_traits::MotorPins`; the crate runs unchanged on the rppal
//! backends, the simulator and the test mocks.
//!
//! ## Architecture
//!
//! - **Bus scheduling**: one worker thread per bus runs device-addressed,
//!   multi-step transactions in due-time order (`scheduler` module)
//! - **Sensors**: pressure and angle pipelines publishing readings through
//!   atomics (`sensor` module)
//! - **Motors**: direction-inverted PWM drive with dead-reckoning restore
//!   (`motor` module)
//! - **Control**: angle seek, pressure seek, valve open/close, continuous
//!   pressure hold, calibration (`controller` module, [`SprinklerHead`])
//! - **Models**: trend detection, overshoot learning, duration tables
//!   (`trend`, `overshoot`, `interpolator`, `calibration`)
//! - **Status**: transaction and operation outcomes (`status` module)
//!
//! ## Units
//!
//! Angles are sensor counts in `0..4096`. Pressures are sensor units with
//! the 12 noise bits dropped, offset so that zero gauge pressure reads 0;
//! see `sensor::psi_from_value`.

pub mod builder;
pub mod calibration;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod interpolator;
pub mod mocks;
pub mod motor;
pub mod overshoot;
pub mod scheduler;
pub mod sensor;
pub mod status;
pub mod trend;

pub use builder::SprinklerHeadBuilder;
pub use calibration::CalibrationTables;
pub use config::HeadConfig;
pub use controller::SprinklerHead;
pub use error::{BuildError, Result, SprinklerError};
pub use motor::{MotorDirection, MotorHandle};
pub use scheduler::{BusScheduler, Completion, Transaction};
pub use status::HwStatus;
