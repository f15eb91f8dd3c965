//! The sprinkler head: nozzle and valve control on top of the bus scheduler.
//!
//! Asynchronous operations return a [`Completion`]; the motor stop that
//! ends each closed-loop move runs as the transaction's side-effect on the
//! bus thread. Follow-up actions that need another transaction (closing the
//! valve after a failed open) run on the caller's thread.

mod calibrated;
mod hold;
mod pressure;
mod rotate;
mod valve;

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sprinkler_traits::Clock;

use crate::calibration::CalibrationTables;
use crate::config::HeadConfig;
use crate::motor::MotorHandle;
use crate::overshoot::OvershootModel;
use crate::scheduler::{BusScheduler, Completion};
use crate::sensor::{AngleSensor, PressureSensor, SensorReader};
use crate::status::HwStatus;

pub use hold::PressureHold;
pub use pressure::PressureSeek;
pub use rotate::{AngleWindow, inertia_offset};

pub struct SprinklerHead {
    // Field order matters for drop: sensors and motors before the scheduler
    // they submit to.
    pub(crate) angle: AngleSensor,
    pub(crate) pressure: PressureSensor,
    pub(crate) nozzle: MotorHandle,
    pub(crate) valve: MotorHandle,
    pub(crate) cfg: HeadConfig,
    pub(crate) clock: Arc<dyn Clock>,
    close_tight_ms: AtomicU64,
    target_pressure: Arc<AtomicI32>,
    overshoot: Arc<Mutex<OvershootModel>>,
    calibration: Mutex<CalibrationTables>,
    scheduler: Arc<BusScheduler>,
}

impl SprinklerHead {
    pub(crate) fn from_parts(
        scheduler: Arc<BusScheduler>,
        nozzle: MotorHandle,
        valve: MotorHandle,
        cfg: HeadConfig,
        clock: Arc<dyn Clock>,
        calibration: CalibrationTables,
    ) -> Self {
        let angle = AngleSensor::new(scheduler.clone(), clock.clone(), &cfg.sensors);
        let pressure = PressureSensor::new(scheduler.clone(), clock.clone(), &cfg.sensors);
        Self {
            angle,
            pressure,
            nozzle,
            valve,
            close_tight_ms: AtomicU64::new(cfg.valve.close_tight_ms),
            target_pressure: Arc::new(AtomicI32::new(0)),
            overshoot: Arc::new(Mutex::new(OvershootModel::from_config(&cfg.overshoot))),
            calibration: Mutex::new(calibration),
            cfg,
            clock,
            scheduler,
        }
    }

    pub fn config(&self) -> &HeadConfig {
        &self.cfg
    }

    pub fn scheduler(&self) -> &Arc<BusScheduler> {
        &self.scheduler
    }

    pub fn nozzle_motor(&self) -> &MotorHandle {
        &self.nozzle
    }

    pub fn valve_motor(&self) -> &MotorHandle {
        &self.valve
    }

    pub fn angle_reader(&self) -> SensorReader {
        self.angle.reader()
    }

    pub fn pressure_reader(&self) -> SensorReader {
        self.pressure.reader()
    }

    // ── Last known / fetched readings ────────────────────────────────────────

    /// Last known nozzle angle in counts.
    pub fn position(&self) -> i32 {
        self.angle.last_value()
    }

    pub fn fetch_position(&self) -> Completion {
        self.angle.read_async()
    }

    pub fn position_fetch(&self) -> Option<i32> {
        self.angle.fetch()
    }

    pub fn position_fetch_if_stale(&self) -> Option<i32> {
        self.angle.fetch_if_stale()
    }

    /// Last known pressure (noise-truncated sensor units).
    pub fn pressure(&self) -> i32 {
        self.pressure.last_value()
    }

    /// Ambient pressure: the lowest reading seen so far.
    pub fn ambient_pressure(&self) -> Option<i32> {
        self.pressure.min_value()
    }

    pub fn pressure_rate(&self) -> i32 {
        self.pressure.last_rate()
    }

    pub fn fetch_pressure(&self) -> Completion {
        self.pressure.read_async()
    }

    pub fn pressure_fetch(&self) -> Option<i32> {
        self.pressure.fetch()
    }

    pub fn pressure_fetch_if_stale(&self) -> Option<i32> {
        self.pressure.fetch_if_stale()
    }

    // ── Shared tuning state ──────────────────────────────────────────────────

    /// Motor time across the closed band of the valve, in ms.
    pub fn close_tight_ms(&self) -> u64 {
        self.close_tight_ms.load(Ordering::Relaxed)
    }

    pub(crate) fn set_close_tight_ms(&self, ms: u64) {
        self.close_tight_ms.store(ms, Ordering::Relaxed);
    }

    pub fn calibration(&self) -> CalibrationTables {
        self.calibration_lock().clone()
    }

    pub fn set_calibration(&self, tables: CalibrationTables) {
        *self.calibration_lock() = tables;
    }

    pub(crate) fn calibration_lock(&self) -> MutexGuard<'_, CalibrationTables> {
        self.calibration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn overshoot_model(&self) -> OvershootModel {
        self.overshoot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// `Completion` for an operation that could not start because a reading was
/// unavailable.
fn no_reading(what: &'static str) -> Completion {
    tracing::warn!(sensor = what, "no fresh reading; operation not started");
    Completion::ready(HwStatus::CommFailure)
}

impl Drop for SprinklerHead {
    fn drop(&mut self) {
        self.angle.abort();
        self.pressure.abort();
        self.nozzle.stop_logged();
        if self.cfg.valve.close_on_exit {
            match self.close_valve(true) {
                Ok(status) if status.is_ok() => tracing::debug!(%status, "valve closed on exit"),
                Ok(status) => tracing::warn!(%status, "valve close on exit did not succeed"),
                Err(e) => tracing::error!(error = %e, "valve close on exit failed"),
            }
        }
        self.valve.stop_logged();
    }
}

impl std::fmt::Debug for SprinklerHead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SprinklerHead")
            .field("position", &self.position())
            .field("pressure", &self.pressure())
            .field("close_tight_ms", &self.close_tight_ms())
            .finish_non_exhaustive()
    }
}
