use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("pwm error: {0}")]
    Pwm(String),
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("no acknowledge from device 0x{address:02x}")]
    Nack { address: u16 },
    #[error("short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer { expected: usize, actual: usize },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;

/// Transfer length check: anything short of `expected` is an error.
pub fn expect_len(expected: usize, actual: usize) -> Result<usize> {
    if actual < expected {
        return Err(HwError::ShortTransfer { expected, actual });
    }
    Ok(actual)
}
