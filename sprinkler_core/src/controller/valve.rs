use std::time::Duration;

use super::SprinklerHead;
use crate::error::Result;
use crate::motor::MotorDirection;
use crate::scheduler::Completion;
use crate::sensor::SensorReader;
use crate::status::HwStatus;
use crate::trend::TrendAnalyzer;

/// Pressure more than `margin` above the ambient minimum.
fn is_water(reader: &SensorReader, pressure: i32, margin: i32) -> bool {
    reader.min().is_some_and(|ambient| pressure > ambient + margin)
}

impl SprinklerHead {
    pub fn is_water_pressure_present(&self) -> bool {
        self.pressure.fetch_if_stale().is_some_and(|p| {
            is_water(
                &self.pressure.reader(),
                p,
                self.cfg.valve.water_pressure_threshold,
            )
        })
    }

    /// Open the valve and wait. Any outcome other than success closes the
    /// valve again before returning.
    pub fn open_valve(&self) -> Result<HwStatus> {
        let status = self.open_valve_async()?.wait();
        if !status.is_success() {
            tracing::warn!(%status, "valve open failed, closing");
            let close = self.close_valve_async()?.wait();
            tracing::debug!(%close, "safety close finished");
        }
        Ok(status)
    }

    /// Start opening the valve. The caller owns the safety close on failure.
    pub fn open_valve_async(&self) -> Result<Completion> {
        if self.is_water_pressure_present() {
            tracing::info!("water pressure already present");
            return Ok(Completion::ready(HwStatus::Success));
        }
        self.run_until_water(MotorDirection::OPEN)
    }

    /// Close the valve and wait; with `tight`, nudge on into the middle of
    /// the closed band.
    pub fn close_valve(&self, tight: bool) -> Result<HwStatus> {
        let status = self.close_valve_async()?.wait();
        if !status.is_success() {
            return Ok(status);
        }
        let tight_ms = self.close_tight_ms();
        if tight && tight_ms != 0 {
            self.valve.run_for(
                MotorDirection::CLOSE,
                Duration::from_millis(tight_ms / 2),
                self.cfg.pressure.default_duty,
            )?;
        }
        self.valve.lock().reset_position();
        Ok(HwStatus::Success)
    }

    /// Start closing the valve. Without water pressure there is nothing to
    /// close against: the valve is driven back by dead reckoning and the
    /// completion is `NoWaterPressure`.
    pub fn close_valve_async(&self) -> Result<Completion> {
        if !self.is_water_pressure_present() {
            tracing::info!("no water pressure, restoring valve position");
            self.valve
                .restore_initial_position(self.cfg.pressure.default_duty)?;
            return Ok(Completion::ready(HwStatus::NoWaterPressure));
        }
        self.run_until_dry(MotorDirection::CLOSE)
    }

    /// Open-loop valve move.
    pub fn turn_valve(&self, direction: MotorDirection, duration: Duration, duty: u8) -> Result<()> {
        self.valve.run_for(direction, duration, duty)
    }

    /// Run the valve motor until water pressure appears, or time out.
    pub(crate) fn run_until_water(&self, direction: MotorDirection) -> Result<Completion> {
        self.valve.run(direction, self.cfg.pressure.default_duty)?;

        let valve = self.valve.clone();
        let clock = self.clock.clone();
        let timeout_ms = self.cfg.valve.open_timeout_ms;
        let margin = self.cfg.valve.water_pressure_threshold;
        // The motor may already have been running this way; time this wait only.
        let started = clock.now();
        Ok(self.pressure.notify_when(
            move |r| {
                if clock.ms_since(started) > timeout_ms {
                    HwStatus::Timeout
                } else if is_water(r, r.value(), margin) {
                    HwStatus::Success
                } else {
                    HwStatus::Repeat
                }
            },
            move |status| {
                valve.stop_logged();
                tracing::debug!(%status, ?direction, "valve run until water finished");
            },
        ))
    }

    /// Run the valve motor until the pressure has fallen to ambient and
    /// stopped falling.
    pub(crate) fn run_until_dry(&self, direction: MotorDirection) -> Result<Completion> {
        self.valve.run(direction, self.cfg.pressure.default_duty)?;

        let valve = self.valve.clone();
        let margin = self.cfg.valve.water_pressure_threshold;
        let mut trend = TrendAnalyzer::new(self.cfg.pressure.trend_window);
        Ok(self.pressure.notify_when(
            move |r| {
                let p = r.value();
                trend.push(p);
                let k = trend.capacity() / 2;
                if trend.is_full() && trend.trend(k) >= 0 && !is_water(r, p, margin) {
                    HwStatus::Success
                } else {
                    HwStatus::Repeat
                }
            },
            move |status| {
                valve.stop_logged();
                tracing::debug!(%status, ?direction, "valve run until dry finished");
            },
        ))
    }
}
