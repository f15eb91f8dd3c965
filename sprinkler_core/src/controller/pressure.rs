use super::{SprinklerHead, inertia_offset, no_reading};
use crate::error::Result;
use crate::motor::MotorDirection;
use crate::scheduler::Completion;
use crate::status::HwStatus;
use crate::trend::TrendAnalyzer;

/// Per-sample check of a pressure seek.
///
/// Succeeds once the pressure crosses the inertia-adjusted threshold. With a
/// full window and a slope that has gone flat or reversed, the valve is at an
/// end stop: opening reports `MaxValueReached`, closing `UnexpectedValue`.
#[derive(Debug, Clone)]
pub struct PressureSeek {
    direction: MotorDirection,
    threshold: i32,
    trend: TrendAnalyzer,
}

impl PressureSeek {
    pub fn new(direction: MotorDirection, target: i32, inertia: i32, window: usize) -> Self {
        let threshold = if direction == MotorDirection::OPEN {
            target - inertia
        } else {
            target + inertia
        };
        Self {
            direction,
            threshold,
            trend: TrendAnalyzer::new(window),
        }
    }

    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    pub fn check(&mut self, pressure: i32) -> HwStatus {
        self.trend.push(pressure);
        let k = self.trend.capacity() / 2;
        if self.direction == MotorDirection::OPEN {
            if pressure > self.threshold {
                HwStatus::Success
            } else if self.trend.is_full() && self.trend.trend(k) <= 0 {
                HwStatus::MaxValueReached
            } else {
                HwStatus::Repeat
            }
        } else if pressure < self.threshold {
            HwStatus::Success
        } else if self.trend.is_full() && self.trend.trend(k) >= 0 {
            HwStatus::UnexpectedValue
        } else {
            HwStatus::Repeat
        }
    }
}

impl SprinklerHead {
    /// Drive the valve until the pressure reaches `target`.
    ///
    /// A target below ambient can never be reached and completes with
    /// `UnexpectedValue` without moving the valve.
    pub fn set_pressure(&self, target: i32, duty: u8) -> Result<Completion> {
        let Some(start) = self.pressure.fetch_if_stale() else {
            return Ok(no_reading("pressure"));
        };
        let cfg = &self.cfg.pressure;
        let diff = target - start;
        let distance = diff.abs();
        if distance < cfg.epsilon {
            return Ok(Completion::ready(HwStatus::Success));
        }
        let ambient = self.pressure.min_value().unwrap_or(start);
        if target < ambient {
            tracing::warn!(target, ambient, "target pressure below ambient");
            return Ok(Completion::ready(HwStatus::UnexpectedValue));
        }

        let direction = if diff > 0 {
            MotorDirection::OPEN
        } else {
            MotorDirection::CLOSE
        };
        self.valve.run(direction, duty)?;

        let inertia = inertia_offset(cfg.inertia, duty, distance, cfg.epsilon);
        let mut seek = PressureSeek::new(direction, target, inertia, cfg.trend_window);
        tracing::debug!(
            start,
            target,
            threshold = seek.threshold(),
            ?direction,
            "seeking pressure"
        );

        let valve = self.valve.clone();
        Ok(self.pressure.notify_when(
            move |r| seek.check(r.value()),
            move |status| {
                valve.stop_logged();
                tracing::debug!(%status, "pressure seek finished");
            },
        ))
    }

    /// Change the pressure by a signed amount from the current reading.
    pub fn set_pressure_by(&self, diff: i32, duty: u8) -> Result<Completion> {
        let Some(current) = self.pressure.fetch_if_stale() else {
            return Ok(no_reading("pressure"));
        };
        self.set_pressure(current + diff, duty)
    }
}
