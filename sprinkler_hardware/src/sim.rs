//! Physics simulator of a sprinkler head.
//!
//! One [`SimRig`] models the nozzle (angle sensor at 0x36) and the valve
//! (pressure sensor at 0x18) on real time. The bus and motor-pin handles it
//! hands out all share the rig state, so a motor started through
//! [`SimMotorPins`] shows up in the next angle or pressure read on [`SimBus`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use sprinkler_traits::{BoxError, I2cBus, MotorPins};
use tracing::trace;

use crate::error::HwError;

pub const PRESSURE_ADDRESS: u16 = 0x18;
pub const ANGLE_ADDRESS: u16 = 0x36;
const ANGLE_REGISTER: u8 = 0x0C;
const ANGLE_RANGE: f64 = 4096.0;

const OUTPUT_MIN: u32 = 0x19_999A;
const OUTPUT_MAX: u32 = 0xE6_6666;
const PSI_FULL_SCALE: f64 = 25.0;

const STATUS_POWERED: u8 = 0x40;
const STATUS_BUSY: u8 = 0x20;
const STATUS_INTEGRITY: u8 = 0x04;
const CONVERSION_TIME: Duration = Duration::from_millis(2);

/// Counts per millisecond at 100 % effort.
const NOZZLE_RATE: f64 = 1.0;
/// Valve travel per millisecond at 100 % effort.
const VALVE_RATE: f64 = 0.001;
const VALVE_TRAVEL: f64 = 1.2;
const VALVE_CLOSED_BAND: f64 = 0.1;
const MAX_LINE_PSI: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimMotor {
    Nozzle,
    Valve,
}

#[derive(Debug, Default, Clone, Copy)]
struct PinState {
    pwm: u8,
    high: bool,
}

impl PinState {
    /// Signed effort in -1.0..=1.0. The H-bridge inverts the PWM when the
    /// direction line is high.
    fn effort(&self) -> f64 {
        if self.high {
            -f64::from(100u8.saturating_sub(self.pwm)) / 100.0
        } else {
            f64::from(self.pwm) / 100.0
        }
    }
}

#[derive(Debug)]
struct RigState {
    last_update: Instant,
    angle: f64,
    valve: f64,
    nozzle_pins: PinState,
    valve_pins: PinState,
    supply_on: bool,
    integrity_fault: bool,
    conversion_ready_at: Option<Instant>,
    latched_pressure: u32,
}

impl RigState {
    fn advance(&mut self, now: Instant) {
        let dt = now.saturating_duration_since(self.last_update).as_secs_f64() * 1000.0;
        self.last_update = now;
        if dt <= 0.0 {
            return;
        }
        // Direction line low turns the nozzle toward increasing angle.
        self.angle = (self.angle + self.nozzle_pins.effort() * NOZZLE_RATE * dt)
            .rem_euclid(ANGLE_RANGE);
        // Direction line high opens the valve.
        self.valve = (self.valve - self.valve_pins.effort() * VALVE_RATE * dt)
            .clamp(-VALVE_TRAVEL, VALVE_TRAVEL);
    }

    fn psi(&self) -> f64 {
        let opening = self.valve.abs();
        if !self.supply_on || opening <= VALVE_CLOSED_BAND {
            return 0.0;
        }
        (opening - VALVE_CLOSED_BAND) / (VALVE_TRAVEL - VALVE_CLOSED_BAND) * MAX_LINE_PSI
    }

    fn pressure_counts(&self) -> u32 {
        let span = f64::from(OUTPUT_MAX - OUTPUT_MIN);
        OUTPUT_MIN + (self.psi() / PSI_FULL_SCALE * span) as u32
    }

    fn pins_mut(&mut self, motor: SimMotor) -> &mut PinState {
        match motor {
            SimMotor::Nozzle => &mut self.nozzle_pins,
            SimMotor::Valve => &mut self.valve_pins,
        }
    }
}

/// Shared simulated head. Cheap to clone; all clones see the same state.
#[derive(Debug, Clone)]
pub struct SimRig {
    state: Arc<Mutex<RigState>>,
}

impl Default for SimRig {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRig {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RigState {
                last_update: Instant::now(),
                angle: 0.0,
                valve: 0.0,
                nozzle_pins: PinState::default(),
                valve_pins: PinState::default(),
                supply_on: true,
                integrity_fault: false,
                conversion_ready_at: None,
                latched_pressure: OUTPUT_MIN,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RigState> {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        st.advance(Instant::now());
        st
    }

    pub fn bus(&self) -> SimBus {
        SimBus {
            rig: self.clone(),
            address: None,
        }
    }

    pub fn nozzle_pins(&self) -> SimMotorPins {
        SimMotorPins {
            rig: self.clone(),
            motor: SimMotor::Nozzle,
        }
    }

    pub fn valve_pins(&self) -> SimMotorPins {
        SimMotorPins {
            rig: self.clone(),
            motor: SimMotor::Valve,
        }
    }

    /// Current nozzle angle in sensor counts.
    pub fn angle(&self) -> u16 {
        self.lock().angle as u16
    }

    pub fn set_angle(&self, counts: u16) {
        self.lock().angle = f64::from(counts) % ANGLE_RANGE;
    }

    /// Ball position in -1.2..=1.2. The valve seals while the position is
    /// within 0.1 of the centre and passes water on either side of it.
    pub fn valve_position(&self) -> f64 {
        self.lock().valve
    }

    pub fn set_valve_position(&self, position: f64) {
        self.lock().valve = position.clamp(-VALVE_TRAVEL, VALVE_TRAVEL);
    }

    pub fn psi(&self) -> f64 {
        self.lock().psi()
    }

    /// Turn the upstream water supply on or off.
    pub fn set_supply(&self, on: bool) {
        self.lock().supply_on = on;
    }

    /// Make the pressure sensor report a failed integrity check.
    pub fn inject_integrity_fault(&self, on: bool) {
        self.lock().integrity_fault = on;
    }

    /// Signed effort currently applied to `motor`.
    pub fn effort(&self, motor: SimMotor) -> f64 {
        let mut st = self.lock();
        st.pins_mut(motor).effort()
    }
}

/// Bus handle onto a [`SimRig`].
#[derive(Debug)]
pub struct SimBus {
    rig: SimRig,
    address: Option<u16>,
}

impl SimBus {
    fn device(&self) -> Result<u16, BoxError> {
        match self.address {
            Some(a @ (PRESSURE_ADDRESS | ANGLE_ADDRESS)) => Ok(a),
            Some(address) => Err(Box::new(HwError::Nack { address })),
            None => Err(Box::new(HwError::I2c("no slave address selected".into()))),
        }
    }
}

impl I2cBus for SimBus {
    fn set_slave_address(&mut self, address: u16) -> Result<(), BoxError> {
        self.address = Some(address);
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, BoxError> {
        let addr = self.device()?;
        let mut st = self.rig.lock();
        if addr == PRESSURE_ADDRESS && buf.first() == Some(&0xAA) {
            st.conversion_ready_at = Some(st.last_update + CONVERSION_TIME);
            st.latched_pressure = st.pressure_counts();
            trace!(counts = st.latched_pressure, "sim pressure conversion started");
        }
        Ok(buf.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        let addr = self.device()?;
        if addr != PRESSURE_ADDRESS {
            return Err(Box::new(HwError::I2c(format!(
                "raw read not supported by 0x{addr:02x}"
            ))));
        }
        let st = self.rig.lock();
        let status = pressure_status(&st);
        let v = st.latched_pressure;
        let frame = [status, (v >> 16) as u8, (v >> 8) as u8, v as u8];
        let n = buf.len().min(frame.len());
        buf[..n].copy_from_slice(&frame[..n]);
        Ok(n)
    }

    fn smbus_receive_byte(&mut self) -> Result<u8, BoxError> {
        let addr = self.device()?;
        if addr != PRESSURE_ADDRESS {
            return Err(Box::new(HwError::Nack { address: addr }));
        }
        Ok(pressure_status(&self.rig.lock()))
    }

    fn smbus_read_word(&mut self, command: u8) -> Result<u16, BoxError> {
        let addr = self.device()?;
        if addr != ANGLE_ADDRESS || command != ANGLE_REGISTER {
            return Err(Box::new(HwError::Nack { address: addr }));
        }
        let angle = self.rig.lock().angle as u16 & 0x0FFF;
        // SMBus delivers the register's high byte first, i.e. in the low half.
        Ok(angle.swap_bytes())
    }
}

fn pressure_status(st: &RigState) -> u8 {
    let mut status = STATUS_POWERED;
    if st
        .conversion_ready_at
        .is_some_and(|ready| st.last_update < ready)
    {
        status |= STATUS_BUSY;
    }
    if st.integrity_fault {
        status |= STATUS_INTEGRITY;
    }
    status
}

/// Motor pin handle onto a [`SimRig`].
#[derive(Debug)]
pub struct SimMotorPins {
    rig: SimRig,
    motor: SimMotor,
}

impl MotorPins for SimMotorPins {
    fn set_duty_percent(&mut self, duty: u8) -> Result<(), BoxError> {
        self.rig.lock().pins_mut(self.motor).pwm = duty.min(100);
        Ok(())
    }

    fn set_direction(&mut self, high: bool) -> Result<(), BoxError> {
        self.rig.lock().pins_mut(self.motor).high = high;
        Ok(())
    }

    fn release(&mut self) -> Result<(), BoxError> {
        *self.rig.lock().pins_mut(self.motor) = PinState::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::thread;

    #[rstest]
    #[case(false, 40, 0.4)]
    #[case(true, 60, -0.4)]
    #[case(true, 100, 0.0)]
    fn effort_accounts_for_inverted_pwm(#[case] high: bool, #[case] pwm: u8, #[case] want: f64) {
        let p = PinState { pwm, high };
        assert!((p.effort() - want).abs() < 1e-9);
    }

    #[test]
    fn angle_word_is_byte_swapped() {
        let rig = SimRig::new();
        rig.set_angle(0x0123);
        let mut bus = rig.bus();
        bus.set_slave_address(ANGLE_ADDRESS).unwrap();
        assert_eq!(bus.smbus_read_word(ANGLE_REGISTER).unwrap(), 0x2301);
    }

    #[test]
    fn unknown_address_nacks() {
        let rig = SimRig::new();
        let mut bus = rig.bus();
        bus.set_slave_address(0x50).unwrap();
        let err = bus.write(&[0]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HwError>(),
            Some(HwError::Nack { address: 0x50 })
        ));
    }

    #[test]
    fn pressure_sensor_is_busy_then_reports_open_valve() {
        let rig = SimRig::new();
        rig.set_valve_position(1.2);
        let mut bus = rig.bus();
        bus.set_slave_address(PRESSURE_ADDRESS).unwrap();
        bus.write(&[0xAA, 0, 0]).unwrap();
        assert_ne!(bus.smbus_receive_byte().unwrap() & STATUS_BUSY, 0);
        thread::sleep(Duration::from_millis(5));
        assert_eq!(bus.smbus_receive_byte().unwrap() & STATUS_BUSY, 0);
        let mut frame = [0u8; 4];
        assert_eq!(bus.read(&mut frame).unwrap(), 4);
        let raw = u32::from_be_bytes([0, frame[1], frame[2], frame[3]]);
        assert!(raw > OUTPUT_MIN);
    }

    #[test]
    fn closed_valve_or_no_supply_reads_zero_psi() {
        let rig = SimRig::new();
        assert_eq!(rig.psi(), 0.0);
        rig.set_valve_position(1.0);
        assert!(rig.psi() > 10.0);
        rig.set_valve_position(-1.0);
        assert!(rig.psi() > 10.0);
        rig.set_valve_position(0.05);
        assert_eq!(rig.psi(), 0.0);
        rig.set_valve_position(1.0);
        rig.set_supply(false);
        assert_eq!(rig.psi(), 0.0);
    }

    #[test]
    fn valve_opens_while_direction_high() {
        let rig = SimRig::new();
        let mut pins = rig.valve_pins();
        pins.set_direction(true).unwrap();
        pins.set_duty_percent(0).unwrap();
        thread::sleep(Duration::from_millis(50));
        pins.release().unwrap();
        assert!(rig.valve_position() > 0.02);
    }
}
