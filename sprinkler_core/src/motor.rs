//! DC motor control through a PWM channel and a direction line.
//!
//! The driver keeps a signed millisecond accumulator of its run time so a
//! motor without a position sensor (the valve) can be driven back to where
//! it started.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use sprinkler_traits::{Clock, MotorPins};

use crate::error::Result;
use crate::hw_error::map_hw_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotorDirection {
    /// Direction line low.
    Forward,
    /// Direction line high.
    Reverse,
}

impl MotorDirection {
    pub const OPEN: Self = Self::Reverse;
    pub const CLOSE: Self = Self::Forward;
    /// Angle increases.
    pub const RIGHT: Self = Self::Forward;
    /// Angle decreases.
    pub const LEFT: Self = Self::Reverse;

    pub fn opposite(self) -> Self {
        match self {
            Self::Forward => Self::Reverse,
            Self::Reverse => Self::Forward,
        }
    }

    /// +1 for `Reverse` (valve opening), -1 for `Forward`.
    pub fn sign(self) -> i32 {
        match self {
            Self::Forward => -1,
            Self::Reverse => 1,
        }
    }

    fn pin_high(self) -> bool {
        self == Self::Reverse
    }
}

#[derive(Debug, Clone, Copy)]
struct Run {
    direction: MotorDirection,
    duty: u8,
    started: Instant,
}

pub struct MotorDriver {
    name: &'static str,
    pins: Box<dyn MotorPins>,
    clock: Arc<dyn Clock>,
    running: Option<Run>,
    last_direction: MotorDirection,
    last_started: Option<Instant>,
    accumulated_ms: i64,
}

impl MotorDriver {
    pub fn new(name: &'static str, pins: impl MotorPins + 'static, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            pins: Box::new(pins),
            clock,
            running: None,
            last_direction: MotorDirection::Forward,
            last_started: None,
            accumulated_ms: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Start turning. A motor already running in `direction` is left alone.
    pub fn run(&mut self, direction: MotorDirection, duty: u8) -> Result<()> {
        if self.running.is_some_and(|r| r.direction == direction) {
            return Ok(());
        }
        self.stop()?;

        let duty = duty.min(100);
        let high = direction.pin_high();
        // The bridge inverts the effective duty while the direction line is high.
        let pwm = if high { 100 - duty } else { duty };
        self.pins
            .set_duty_percent(pwm)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("set duty")?;
        self.pins
            .set_direction(high)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("set direction")?;

        let started = self.clock.now();
        self.running = Some(Run {
            direction,
            duty,
            started,
        });
        self.last_direction = direction;
        self.last_started = Some(started);
        tracing::debug!(motor = self.name, ?direction, duty, "motor run");
        Ok(())
    }

    /// Release the pins and fold the elapsed run time into the accumulator.
    pub fn stop(&mut self) -> Result<()> {
        let Some(run) = self.running.take() else {
            return Ok(());
        };
        let elapsed = self.clock.ms_since(run.started) as i64;
        self.accumulated_ms += i64::from(run.direction.sign()) * elapsed;
        tracing::debug!(
            motor = self.name,
            elapsed_ms = elapsed,
            accumulated_ms = self.accumulated_ms,
            "motor stop"
        );
        self.pins
            .release()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("motor stop")
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Direction of the current run, or of the last one once stopped.
    pub fn last_direction(&self) -> MotorDirection {
        self.last_direction
    }

    pub fn duty(&self) -> Option<u8> {
        self.running.map(|r| r.duty)
    }

    /// Start time of the most recent run.
    pub fn started_at(&self) -> Option<Instant> {
        self.last_started
    }

    /// Signed run time in ms: positive means net `Reverse` travel.
    pub fn accumulated_ms(&self) -> i64 {
        self.accumulated_ms
    }

    /// Treat the current position as the neutral one.
    pub fn reset_position(&mut self) {
        self.accumulated_ms = 0;
    }
}

impl std::fmt::Debug for MotorDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotorDriver")
            .field("name", &self.name)
            .field("running", &self.running)
            .field("accumulated_ms", &self.accumulated_ms)
            .finish_non_exhaustive()
    }
}

/// Shared handle to a [`MotorDriver`].
///
/// Completion side-effects on the bus thread and callers both hold one.
/// Timed runs sleep without holding the lock.
#[derive(Clone)]
pub struct MotorHandle {
    inner: Arc<Mutex<MotorDriver>>,
    clock: Arc<dyn Clock>,
}

impl MotorHandle {
    pub fn new(driver: MotorDriver) -> Self {
        let clock = driver.clock.clone();
        Self {
            inner: Arc::new(Mutex::new(driver)),
            clock,
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, MotorDriver> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn run(&self, direction: MotorDirection, duty: u8) -> Result<()> {
        self.lock().run(direction, duty)
    }

    pub fn stop(&self) -> Result<()> {
        self.lock().stop()
    }

    /// Stop from a context that cannot propagate errors.
    pub fn stop_logged(&self) {
        let mut m = self.lock();
        if let Err(e) = m.stop() {
            tracing::error!(motor = m.name(), error = %e, "failed to stop motor");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_running()
    }

    pub fn last_direction(&self) -> MotorDirection {
        self.lock().last_direction()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.lock().started_at()
    }

    pub fn accumulated_ms(&self) -> i64 {
        self.lock().accumulated_ms()
    }

    /// Blocking open-loop run.
    pub fn run_for(&self, direction: MotorDirection, duration: Duration, duty: u8) -> Result<()> {
        self.run(direction, duty)?;
        self.clock.sleep(duration);
        self.stop()
    }

    /// Drive back by the accumulated run time, then zero the accumulator.
    pub fn restore_initial_position(&self, duty: u8) -> Result<()> {
        let acc = {
            let mut m = self.lock();
            m.stop()?;
            m.accumulated_ms()
        };
        if acc != 0 {
            let direction = if acc > 0 {
                MotorDirection::Forward
            } else {
                MotorDirection::Reverse
            };
            tracing::debug!(accumulated_ms = acc, ?direction, "restoring initial position");
            self.run_for(direction, Duration::from_millis(acc.unsigned_abs()), duty)?;
        }
        self.lock().reset_position();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{PinCall, SpyPins};
    use sprinkler_traits::ManualClock;

    fn driver() -> (MotorHandle, SpyPins, ManualClock) {
        let pins = SpyPins::new();
        let clock = ManualClock::new();
        let m = MotorDriver::new("test", pins.clone(), Arc::new(clock.clone()));
        (MotorHandle::new(m), pins, clock)
    }

    #[test]
    fn duty_is_inverted_when_direction_line_high() {
        let (m, pins, _) = driver();
        m.run(MotorDirection::Reverse, 30).unwrap();
        assert_eq!(
            pins.calls(),
            vec![PinCall::Duty(70), PinCall::Direction(true)]
        );
    }

    #[test]
    fn same_direction_run_is_a_no_op() {
        let (m, pins, _) = driver();
        m.run(MotorDirection::Forward, 40).unwrap();
        m.run(MotorDirection::Forward, 80).unwrap();
        assert_eq!(
            pins.calls(),
            vec![PinCall::Duty(40), PinCall::Direction(false)]
        );
    }

    #[test]
    fn reversing_stops_first() {
        let (m, pins, _) = driver();
        m.run(MotorDirection::Forward, 100).unwrap();
        m.run(MotorDirection::Reverse, 100).unwrap();
        assert_eq!(
            pins.calls(),
            vec![
                PinCall::Duty(100),
                PinCall::Direction(false),
                PinCall::Release,
                PinCall::Duty(0),
                PinCall::Direction(true),
            ]
        );
    }

    #[test]
    fn accumulator_is_signed_by_direction() {
        let (m, _, clock) = driver();
        m.run(MotorDirection::OPEN, 100).unwrap();
        clock.advance_ms(120);
        m.stop().unwrap();
        m.run(MotorDirection::CLOSE, 100).unwrap();
        clock.advance_ms(20);
        m.stop().unwrap();
        assert_eq!(m.accumulated_ms(), 100);
        assert_eq!(m.last_direction(), MotorDirection::CLOSE);
    }

    #[test]
    fn restore_runs_opposite_for_accumulated_time() {
        let (m, pins, clock) = driver();
        m.run_for(MotorDirection::OPEN, Duration::from_millis(75), 100).unwrap();
        assert_eq!(m.accumulated_ms(), 75);
        let t0 = clock.elapsed();
        m.restore_initial_position(100).unwrap();
        assert_eq!(clock.elapsed() - t0, Duration::from_millis(75));
        assert_eq!(m.accumulated_ms(), 0);
        assert!(!m.is_running());
        let calls = pins.calls();
        assert_eq!(calls[calls.len() - 3], PinCall::Duty(100));
        assert_eq!(calls[calls.len() - 2], PinCall::Direction(false));
        assert_eq!(calls[calls.len() - 1], PinCall::Release);
    }

    #[test]
    fn restore_with_nothing_accumulated_does_not_move() {
        let (m, pins, _) = driver();
        m.restore_initial_position(100).unwrap();
        assert!(pins.calls().is_empty());
    }

    #[test]
    fn stop_when_idle_touches_nothing() {
        let (m, pins, _) = driver();
        m.stop().unwrap();
        assert!(pins.calls().is_empty());
    }
}
