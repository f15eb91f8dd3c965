use rppal::i2c::I2c;
use sprinkler_traits::{BoxError, I2cBus};
use tracing::{debug, trace};

use crate::error::{HwError, Result, expect_len};

/// `/dev/i2c-N` handle driven through rppal.
pub struct RppalI2cBus {
    i2c: I2c,
}

impl RppalI2cBus {
    pub fn open(bus: u8) -> Result<Self> {
        let i2c = I2c::with_bus(bus).map_err(|e| HwError::I2c(e.to_string()))?;
        debug!(bus, "i2c bus opened");
        Ok(Self { i2c })
    }
}

fn i2c_err(e: rppal::i2c::Error) -> BoxError {
    Box::new(HwError::I2c(e.to_string()))
}

impl I2cBus for RppalI2cBus {
    fn set_slave_address(&mut self, address: u16) -> std::result::Result<(), BoxError> {
        self.i2c.set_slave_address(address).map_err(i2c_err)
    }

    fn write(&mut self, buf: &[u8]) -> std::result::Result<usize, BoxError> {
        let n = self.i2c.write(buf).map_err(i2c_err)?;
        trace!(len = n, "i2c write");
        expect_len(buf.len(), n).map_err(Into::into)
    }

    fn read(&mut self, buf: &mut [u8]) -> std::result::Result<usize, BoxError> {
        let n = self.i2c.read(buf).map_err(i2c_err)?;
        trace!(len = n, "i2c read");
        expect_len(buf.len(), n).map_err(Into::into)
    }

    fn smbus_receive_byte(&mut self) -> std::result::Result<u8, BoxError> {
        self.i2c.smbus_receive_byte().map_err(i2c_err)
    }

    fn smbus_read_word(&mut self, command: u8) -> std::result::Result<u16, BoxError> {
        self.i2c.smbus_read_word(command).map_err(i2c_err)
    }
}
