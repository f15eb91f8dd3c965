use rppal::gpio::{Gpio, OutputPin};
use rppal::pwm::{Channel, Polarity, Pwm};
use sprinkler_traits::{BoxError, MotorPins};
use tracing::debug;

use crate::error::{HwError, Result};

/// Hardware PWM channel plus a GPIO direction line.
pub struct PwmMotorPins {
    pwm: Pwm,
    dir: OutputPin,
}

impl PwmMotorPins {
    /// `channel` is 0 or 1 (PWM0/PWM1), `dir_pin` a BCM GPIO number.
    pub fn new(channel: u8, dir_pin: u8, frequency_hz: f64) -> Result<Self> {
        let channel = match channel {
            0 => Channel::Pwm0,
            1 => Channel::Pwm1,
            other => return Err(HwError::Pwm(format!("no such PWM channel {other}"))),
        };
        let pwm = Pwm::with_frequency(channel, frequency_hz, 0.0, Polarity::Normal, false)
            .map_err(|e| HwError::Pwm(e.to_string()))?;
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut dir = gpio
            .get(dir_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        dir.set_low();
        debug!(?channel, dir_pin, frequency_hz, "motor pins ready");
        Ok(Self { pwm, dir })
    }
}

fn pwm_err(e: rppal::pwm::Error) -> BoxError {
    Box::new(HwError::Pwm(e.to_string()))
}

impl MotorPins for PwmMotorPins {
    fn set_duty_percent(&mut self, duty: u8) -> std::result::Result<(), BoxError> {
        let duty = f64::from(duty.min(100)) / 100.0;
        self.pwm.set_duty_cycle(duty).map_err(pwm_err)?;
        self.pwm.enable().map_err(pwm_err)
    }

    fn set_direction(&mut self, high: bool) -> std::result::Result<(), BoxError> {
        if high {
            self.dir.set_high();
        } else {
            self.dir.set_low();
        }
        Ok(())
    }

    fn release(&mut self) -> std::result::Result<(), BoxError> {
        self.pwm.set_duty_cycle(0.0).map_err(pwm_err)?;
        self.pwm.disable().map_err(pwm_err)?;
        self.dir.set_low();
        Ok(())
    }
}
