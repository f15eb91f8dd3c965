//! Continuous pressure hold.
//!
//! Every pressure sample runs [`PressureHold::process`]: start or reverse
//! the valve toward the target, stop early by the drift the overshoot model
//! predicts for the current rate, and learn the real drift once the pressure
//! settles after a stop.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::SprinklerHead;
use crate::config::HoldCfg;
use crate::error::Result;
use crate::motor::{MotorDirection, MotorHandle};
use crate::overshoot::OvershootModel;
use crate::scheduler::Completion;
use crate::status::HwStatus;

pub struct PressureHold {
    cfg: HoldCfg,
    duty: u8,
    target: Arc<AtomicI32>,
    overshoot: Arc<Mutex<OvershootModel>>,
    samples_since_start: u32,
    /// Pressure and rate when the motor last stopped, until the drift is learnt.
    stopped_at: Option<(i32, i32)>,
}

impl PressureHold {
    pub fn new(
        cfg: HoldCfg,
        duty: u8,
        target: Arc<AtomicI32>,
        overshoot: Arc<Mutex<OvershootModel>>,
    ) -> Self {
        Self {
            cfg,
            duty,
            target,
            overshoot,
            samples_since_start: 0,
            stopped_at: None,
        }
    }

    fn stop(&mut self, valve: &MotorHandle, pressure: i32, rate: i32) -> HwStatus {
        if !valve.is_running() {
            return HwStatus::Repeat;
        }
        if let Err(e) = valve.stop() {
            tracing::error!(error = %e, "hold: valve stop failed");
            return HwStatus::Failure;
        }
        self.stopped_at = Some((pressure, rate));
        HwStatus::Repeat
    }

    /// One sample. Returns `Repeat` while holding; anything else ends the hold.
    pub fn process(&mut self, pressure: i32, rate: i32, valve: &MotorHandle) -> HwStatus {
        self.samples_since_start = self.samples_since_start.saturating_add(1);
        let sign = valve.last_direction().sign();

        if self.samples_since_start > self.cfg.min_samples && rate * sign <= 0 {
            if valve.is_running() {
                valve.stop_logged();
                tracing::error!(pressure, rate, "hold: valve at its limit");
                return HwStatus::MaxValueReached;
            }
            if let Some((p_stop, rate_stop)) = self.stopped_at.take() {
                let drift = (pressure - p_stop).abs();
                self.overshoot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .set_overshoot(rate_stop, drift);
                tracing::debug!(rate = rate_stop, drift, "hold: learnt overshoot");
            }
        }

        let target = self.target.load(Ordering::Relaxed);
        let diff = target - pressure;
        if diff.abs() <= self.cfg.tolerance {
            return self.stop(valve, pressure, rate);
        }

        let required = if diff > 0 {
            MotorDirection::OPEN
        } else {
            MotorDirection::CLOSE
        };
        if !valve.is_running() || valve.last_direction() != required {
            tracing::debug!(pressure, target, direction = ?required, "hold: starting valve");
            if let Err(e) = valve.run(required, self.duty) {
                tracing::error!(error = %e, "hold: valve run failed");
                return HwStatus::Failure;
            }
            self.samples_since_start = 0;
            return HwStatus::Repeat;
        }

        if self.samples_since_start < self.cfg.min_samples {
            return HwStatus::Repeat;
        }

        let predicted = self
            .overshoot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .predict(rate);
        let adjusted = target - predicted * required.sign();
        let reached = if required == MotorDirection::OPEN {
            pressure >= adjusted
        } else {
            pressure <= adjusted
        };
        if reached {
            tracing::debug!(pressure, rate, target, adjusted, "hold: stopping ahead of target");
            return self.stop(valve, pressure, rate);
        }
        HwStatus::Repeat
    }
}

impl SprinklerHead {
    /// Hold the pressure at `target` until [`stop_pressure_hold`] or a
    /// mechanical limit ends it.
    ///
    /// [`stop_pressure_hold`]: SprinklerHead::stop_pressure_hold
    pub fn start_pressure_hold(&self, target: i32) -> Result<Completion> {
        self.set_target_pressure(target);
        let mut hold = PressureHold::new(
            self.cfg.hold.clone(),
            self.cfg.pressure.default_duty,
            self.target_pressure.clone(),
            self.overshoot.clone(),
        );
        let valve = self.valve.clone();
        let watch = valve.clone();
        tracing::info!(target, "pressure hold started");
        Ok(self.pressure.notify_when(
            move |r| hold.process(r.value(), r.rate(), &watch),
            move |status| {
                valve.stop_logged();
                tracing::info!(%status, "pressure hold ended");
            },
        ))
    }

    /// Retarget a running hold.
    pub fn set_target_pressure(&self, target: i32) {
        self.target_pressure.store(target, Ordering::Relaxed);
    }

    pub fn target_pressure(&self) -> i32 {
        self.target_pressure.load(Ordering::Relaxed)
    }

    /// End a running hold; its completion reports `Abort`.
    pub fn stop_pressure_hold(&self) -> bool {
        self.pressure.abort()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{PinCall, SpyPins};
    use crate::motor::MotorDriver;
    use sprinkler_traits::ManualClock;

    struct Rig {
        hold: PressureHold,
        valve: MotorHandle,
        pins: SpyPins,
        model: Arc<Mutex<OvershootModel>>,
    }

    fn rig(target: i32) -> Rig {
        let pins = SpyPins::new();
        let valve = MotorHandle::new(MotorDriver::new(
            "valve",
            pins.clone(),
            Arc::new(ManualClock::new()),
        ));
        let model = Arc::new(Mutex::new(OvershootModel::new(10, 1000)));
        let hold = PressureHold::new(
            HoldCfg::default(),
            100,
            Arc::new(AtomicI32::new(target)),
            model.clone(),
        );
        Rig {
            hold,
            valve,
            pins,
            model,
        }
    }

    #[test]
    fn within_tolerance_with_idle_valve_does_nothing() {
        let mut r = rig(500);
        assert_eq!(r.hold.process(510, 0, &r.valve), HwStatus::Repeat);
        assert!(r.pins.calls().is_empty());
    }

    #[test]
    fn starts_toward_target_and_stops_in_tolerance() {
        let mut r = rig(500);
        assert_eq!(r.hold.process(300, 0, &r.valve), HwStatus::Repeat);
        assert!(r.valve.is_running());
        assert_eq!(r.valve.last_direction(), MotorDirection::OPEN);
        for p in [320, 340, 360] {
            assert_eq!(r.hold.process(p, 200, &r.valve), HwStatus::Repeat);
        }
        assert_eq!(r.hold.process(490, 200, &r.valve), HwStatus::Repeat);
        assert!(!r.valve.is_running());
        assert_eq!(r.pins.calls().last(), Some(&PinCall::Release));
    }

    #[test]
    fn reverses_when_target_drops() {
        let mut r = rig(500);
        r.hold.process(300, 0, &r.valve);
        r.hold.target.store(100, Ordering::Relaxed);
        r.hold.process(300, 100, &r.valve);
        assert_eq!(r.valve.last_direction(), MotorDirection::CLOSE);
        assert!(r.valve.is_running());
    }

    #[test]
    fn flat_rate_while_running_is_a_limit() {
        let mut r = rig(900);
        r.hold.process(300, 0, &r.valve);
        for _ in 0..3 {
            assert_eq!(r.hold.process(400, 100, &r.valve), HwStatus::Repeat);
        }
        assert_eq!(r.hold.process(400, 0, &r.valve), HwStatus::MaxValueReached);
        assert!(!r.valve.is_running());
    }

    #[test]
    fn stops_early_by_predicted_overshoot() {
        let mut r = rig(500);
        r.model.lock().unwrap().set_overshoot(200, 60);
        r.hold.process(300, 0, &r.valve);
        for p in [350, 400, 420] {
            r.hold.process(p, 200, &r.valve);
        }
        assert!(r.valve.is_running());
        // Outside tolerance but past the adjusted target of 440.
        assert_eq!(r.hold.process(445, 200, &r.valve), HwStatus::Repeat);
        assert!(!r.valve.is_running());
    }

    #[test]
    fn learns_drift_after_stop() {
        let mut r = rig(500);
        r.hold.process(300, 0, &r.valve);
        for p in [350, 400, 450] {
            r.hold.process(p, 300, &r.valve);
        }
        // Stops inside tolerance at rate 300.
        r.hold.process(485, 300, &r.valve);
        assert!(!r.valve.is_running());
        // Drift continues while the count since start keeps rising.
        r.hold.process(505, 100, &r.valve);
        r.hold.process(515, 0, &r.valve);
        let predicted = r.model.lock().unwrap().predict(300);
        assert_eq!(predicted, 30);
    }
}
