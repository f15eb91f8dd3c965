pub mod clock;

pub use clock::{Clock, MonotonicClock};

#[cfg(any(test, feature = "test-util"))]
pub use clock::test_clock::ManualClock;

/// Error type carried across the hardware seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Single-master, addressed serial bus (I²C).
///
/// Only ever driven from one thread at a time; the scheduler owns the handle
/// and selects a device address before each command.
pub trait I2cBus: Send {
    fn set_slave_address(&mut self, address: u16) -> Result<(), BoxError>;
    fn write(&mut self, buf: &[u8]) -> Result<usize, BoxError>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BoxError>;

    /// SMBus "receive byte": a single read with no command code.
    fn smbus_receive_byte(&mut self) -> Result<u8, BoxError>;

    /// SMBus "read word" of `command`, returned as the bus delivers it
    /// (low byte first on the wire).
    fn smbus_read_word(&mut self, command: u8) -> Result<u16, BoxError>;
}

/// PWM output plus direction line of one DC motor H-bridge.
pub trait MotorPins: Send {
    /// Duty cycle in percent, 0..=100. Already inverted by the caller when
    /// the direction line is high.
    fn set_duty_percent(&mut self, duty: u8) -> Result<(), BoxError>;
    fn set_direction(&mut self, high: bool) -> Result<(), BoxError>;
    /// Stop driving: PWM off and direction line low.
    fn release(&mut self) -> Result<(), BoxError>;
}

impl<T: I2cBus + ?Sized> I2cBus for Box<T> {
    fn set_slave_address(&mut self, address: u16) -> Result<(), BoxError> {
        (**self).set_slave_address(address)
    }
    fn write(&mut self, buf: &[u8]) -> Result<usize, BoxError> {
        (**self).write(buf)
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        (**self).read(buf)
    }
    fn smbus_receive_byte(&mut self) -> Result<u8, BoxError> {
        (**self).smbus_receive_byte()
    }
    fn smbus_read_word(&mut self, command: u8) -> Result<u16, BoxError> {
        (**self).smbus_read_word(command)
    }
}

impl<T: MotorPins + ?Sized> MotorPins for Box<T> {
    fn set_duty_percent(&mut self, duty: u8) -> Result<(), BoxError> {
        (**self).set_duty_percent(duty)
    }
    fn set_direction(&mut self, high: bool) -> Result<(), BoxError> {
        (**self).set_direction(high)
    }
    fn release(&mut self) -> Result<(), BoxError> {
        (**self).release()
    }
}
