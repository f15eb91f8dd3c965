//! Type-state builder for [`SprinklerHead`].
//!
//! The bus and both motors must be provided before `build()` is available.
//! `try_build()` is always available and reports the missing piece instead.

use std::marker::PhantomData;
use std::sync::Arc;

use sprinkler_traits::{Clock, I2cBus, MonotonicClock, MotorPins};

use crate::calibration::CalibrationTables;
use crate::config::HeadConfig;
use crate::controller::SprinklerHead;
use crate::error::{BuildError, Result};
use crate::motor::{MotorDriver, MotorHandle};
use crate::scheduler::BusScheduler;

pub struct Missing;
pub struct Set;

pub struct SprinklerHeadBuilder<B, N, V> {
    bus: Option<Box<dyn I2cBus>>,
    nozzle: Option<Box<dyn MotorPins>>,
    valve: Option<Box<dyn MotorPins>>,
    config: Option<HeadConfig>,
    calibration: Option<CalibrationTables>,
    clock: Option<Arc<dyn Clock>>,
    _state: PhantomData<(B, N, V)>,
}

impl Default for SprinklerHeadBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            bus: None,
            nozzle: None,
            valve: None,
            config: None,
            calibration: None,
            clock: None,
            _state: PhantomData,
        }
    }
}

impl SprinklerHead {
    pub fn builder() -> SprinklerHeadBuilder<Missing, Missing, Missing> {
        SprinklerHeadBuilder::default()
    }
}

fn validate(cfg: &HeadConfig) -> Result<()> {
    let invalid = |msg| Err(eyre::Report::new(BuildError::InvalidConfig(msg)));
    if cfg.rotation.epsilon <= 0 {
        return invalid("rotation epsilon must be > 0");
    }
    if cfg.rotation.default_duty == 0 || cfg.rotation.default_duty > 100 {
        return invalid("rotation duty must be 1..=100");
    }
    if cfg.pressure.default_duty == 0 || cfg.pressure.default_duty > 100 {
        return invalid("valve duty must be 1..=100");
    }
    if cfg.pressure.trend_window < 2 {
        return invalid("trend window must be >= 2");
    }
    if cfg.sensors.stale_ms == 0 {
        return invalid("sensor stale_ms must be >= 1");
    }
    if cfg.overshoot.buckets == 0 || cfg.overshoot.max_rate <= 0 {
        return invalid("overshoot model needs buckets > 0 and max_rate > 0");
    }
    if cfg.valve.open_timeout_ms == 0 {
        return invalid("valve open timeout must be > 0");
    }
    Ok(())
}

impl<B, N, V> SprinklerHeadBuilder<B, N, V> {
    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<SprinklerHead> {
        let bus = self
            .bus
            .ok_or_else(|| eyre::Report::new(BuildError::MissingBus))?;
        let nozzle = self
            .nozzle
            .ok_or_else(|| eyre::Report::new(BuildError::MissingNozzleMotor))?;
        let valve = self
            .valve
            .ok_or_else(|| eyre::Report::new(BuildError::MissingValveMotor))?;
        let cfg = self.config.unwrap_or_default();
        validate(&cfg)?;

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(MonotonicClock));
        let scheduler = Arc::new(BusScheduler::spawn(bus)?);
        let nozzle = MotorHandle::new(MotorDriver::new("nozzle", nozzle, clock.clone()));
        let valve = MotorHandle::new(MotorDriver::new("valve", valve, clock.clone()));

        Ok(SprinklerHead::from_parts(
            scheduler,
            nozzle,
            valve,
            cfg,
            clock,
            self.calibration.unwrap_or_default(),
        ))
    }

    pub fn with_config(mut self, config: HeadConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_calibration(mut self, tables: CalibrationTables) -> Self {
        self.calibration = Some(tables);
        self
    }

    /// Defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    fn retype<B2, N2, V2>(self) -> SprinklerHeadBuilder<B2, N2, V2> {
        SprinklerHeadBuilder {
            bus: self.bus,
            nozzle: self.nozzle,
            valve: self.valve,
            config: self.config,
            calibration: self.calibration,
            clock: self.clock,
            _state: PhantomData,
        }
    }
}

impl<N, V> SprinklerHeadBuilder<Missing, N, V> {
    pub fn with_bus(mut self, bus: impl I2cBus + 'static) -> SprinklerHeadBuilder<Set, N, V> {
        self.bus = Some(Box::new(bus));
        self.retype()
    }
}

impl<B, V> SprinklerHeadBuilder<B, Missing, V> {
    pub fn with_nozzle_motor(
        mut self,
        pins: impl MotorPins + 'static,
    ) -> SprinklerHeadBuilder<B, Set, V> {
        self.nozzle = Some(Box::new(pins));
        self.retype()
    }
}

impl<B, N> SprinklerHeadBuilder<B, N, Missing> {
    pub fn with_valve_motor(
        mut self,
        pins: impl MotorPins + 'static,
    ) -> SprinklerHeadBuilder<B, N, Set> {
        self.valve = Some(Box::new(pins));
        self.retype()
    }
}

impl SprinklerHeadBuilder<Set, Set, Set> {
    pub fn build(self) -> Result<SprinklerHead> {
        self.try_build()
    }
}
