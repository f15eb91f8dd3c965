//! Open-loop calibration sweeps and the duration-based moves they enable.

use std::thread;
use std::time::Duration;

use super::SprinklerHead;
use crate::error::{Result, SprinklerError};
use crate::interpolator::Interpolator;
use crate::motor::MotorDirection;
use crate::scheduler::Completion;
use crate::sensor::forward_distance;
use crate::status::HwStatus;

fn direction_of(diff: i32) -> MotorDirection {
    if diff > 0 {
        MotorDirection::RIGHT
    } else {
        MotorDirection::LEFT
    }
}

impl SprinklerHead {
    fn settle(&self, ms: u64) {
        self.clock.sleep(Duration::from_millis(ms));
    }

    /// Measure the nozzle travel of geometrically growing pulses, from
    /// `min_us` up to (excluding) `max_us`, in both directions.
    pub fn calibrate_nozzle(&self, min_us: u64, max_us: u64, multiplier: f64) -> Result<HwStatus> {
        if min_us == 0 || multiplier <= 1.0 || !multiplier.is_finite() {
            return Err(eyre::Report::new(SprinklerError::Config(format!(
                "nozzle sweep needs min_us > 0 and multiplier > 1 (got {min_us}, {multiplier})"
            ))));
        }
        let cal = self.cfg.calibration.clone();
        let duty = self.cfg.rotation.default_duty;

        for direction in [MotorDirection::LEFT, MotorDirection::RIGHT] {
            self.nozzle
                .run_for(direction, Duration::from_millis(cal.pre_run_ms), duty)?;
            self.settle(cal.settle_ms);
            let Some(mut start) = self.angle.fetch() else {
                return Ok(HwStatus::CommFailure);
            };

            let mut points = Vec::new();
            let mut pulse_us = min_us;
            while pulse_us < max_us {
                self.nozzle
                    .run_for(direction, Duration::from_micros(pulse_us), duty)?;
                self.settle(cal.settle_ms);
                let Some(end) = self.angle.fetch() else {
                    return Ok(HwStatus::CommFailure);
                };
                let distance = forward_distance(start, end, direction);
                start = end;
                points.push((i64::from(distance), pulse_us as i64));
                pulse_us = ((pulse_us as f64) * multiplier).ceil() as u64;
            }

            tracing::info!(?direction, ?points, "nozzle distance/duration table");
            *self.calibration_lock().nozzle_mut(direction) = Interpolator::new(points);
        }
        Ok(HwStatus::Success)
    }

    /// Step the valve open from closed until the pressure stops rising and
    /// record (pressure, cumulative ms) pairs.
    pub fn calibrate_valve(&self, step_ms: u64) -> Result<HwStatus> {
        if step_ms == 0 {
            return Err(eyre::Report::new(SprinklerError::Config(
                "valve step must be > 0 ms".into(),
            )));
        }
        let status = self.find_close_tight_position()?;
        if !status.is_success() {
            return Ok(status);
        }
        let status = self.open_valve()?;
        if !status.is_success() {
            return Ok(status);
        }
        let status = self.close_valve(false)?;
        if !status.is_ok() {
            return Ok(status);
        }

        let Some(mut previous) = self.pressure.fetch() else {
            return Ok(HwStatus::CommFailure);
        };
        let mut points = vec![(i64::from(previous), 0)];
        let duty = self.cfg.pressure.default_duty;
        let mut total_ms = step_ms;
        loop {
            self.turn_valve(MotorDirection::OPEN, Duration::from_millis(step_ms), duty)?;
            self.settle(step_ms * 2);
            let Some(current) = self.pressure.fetch() else {
                return Ok(HwStatus::CommFailure);
            };
            if previous >= current {
                break;
            }
            points.push((i64::from(current), total_ms as i64));
            previous = current;
            total_ms += step_ms;
        }

        tracing::info!(?points, "valve pressure/duration table");
        self.calibration_lock().valve = Interpolator::new(points);
        self.close_valve(true)
    }

    /// Measure the width of the closed band and park the valve in its middle.
    pub fn find_close_tight_position(&self) -> Result<HwStatus> {
        let status = self.open_valve()?;
        if !status.is_success() {
            return Ok(status);
        }
        let status = self.close_valve(false)?;
        if !status.is_ok() {
            return Ok(status);
        }

        // Keep closing through the band until water flows on the far side.
        let started = self.clock.now();
        let status = self.run_until_water(MotorDirection::CLOSE)?.wait();
        if !status.is_success() {
            return Ok(status);
        }
        let closed_ms = self.clock.ms_since(started);
        self.set_close_tight_ms(closed_ms);
        tracing::info!(closed_ms, "closed band measured");

        let status = self.run_until_dry(MotorDirection::OPEN)?.wait();
        if !status.is_success() {
            return Ok(status);
        }
        self.turn_valve(
            MotorDirection::OPEN,
            Duration::from_millis(closed_ms / 2),
            self.cfg.pressure.default_duty,
        )?;
        self.valve.lock().reset_position();
        Ok(HwStatus::Success)
    }

    /// Pulse length for a signed rotation, from the calibration table.
    fn nozzle_pulse(&self, diff: i32) -> (MotorDirection, u64) {
        let direction = direction_of(diff);
        let us = self
            .calibration_lock()
            .nozzle(direction)
            .predict(i64::from(diff.abs()));
        (direction, u64::try_from(us).unwrap_or(0))
    }

    /// Rotate by `diff` counts open-loop.
    pub fn rotate_by_duration(&self, diff: i32) -> Result<()> {
        let (direction, us) = self.nozzle_pulse(diff);
        tracing::debug!(position = self.position(), diff, us, "timed rotation");
        if us > 0 {
            self.nozzle.run_for(
                direction,
                Duration::from_micros(us),
                self.cfg.rotation.default_duty,
            )?;
        }
        Ok(())
    }

    /// [`rotate_by_duration`](Self::rotate_by_duration) on a helper thread.
    pub fn rotate_by_duration_async(&self, diff: i32) -> Result<Completion> {
        let (direction, us) = self.nozzle_pulse(diff);
        if us == 0 {
            return Ok(Completion::ready(HwStatus::Success));
        }
        let (sender, completion) = Completion::pair();
        let nozzle = self.nozzle.clone();
        let duty = self.cfg.rotation.default_duty;
        thread::Builder::new()
            .name("nozzle-timed".into())
            .spawn(move || {
                let status = match nozzle.run_for(direction, Duration::from_micros(us), duty) {
                    Ok(()) => HwStatus::Success,
                    Err(e) => {
                        tracing::error!(error = %e, "timed rotation failed");
                        HwStatus::Failure
                    }
                };
                sender.fire(status);
            })
            .map_err(|e| eyre::Report::new(SprinklerError::Hardware(e.to_string())))?;
        Ok(completion)
    }

    /// Move the valve open-loop to where the calibration table puts `target`.
    pub fn set_pressure_by_duration(&self, target: i32) -> Result<HwStatus> {
        let Some(current) = self.pressure.fetch_if_stale() else {
            return Ok(HwStatus::CommFailure);
        };
        let ms = {
            let cal = self.calibration_lock();
            (cal.valve.predict(i64::from(target)) - cal.valve.predict(i64::from(current)))
                .unsigned_abs()
        };
        let direction = if target > current {
            MotorDirection::OPEN
        } else {
            MotorDirection::CLOSE
        };
        tracing::debug!(current, target, ms, ?direction, "timed valve move");
        if ms > 0 {
            self.turn_valve(
                direction,
                Duration::from_millis(ms),
                self.cfg.pressure.default_duty,
            )?;
        }
        Ok(HwStatus::Success)
    }
}
