//! Test and helper mocks for sprinkler_core.
//!
//! Scripted buses and spy motor pins share their state behind `Arc`, so a
//! test keeps a clone to inspect what the scheduler thread did.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sprinkler_traits::{BoxError, I2cBus, MotorPins};

/// A bus on which every transfer succeeds and reads return zeroes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBus;

impl I2cBus for NoopBus {
    fn set_slave_address(&mut self, _address: u16) -> Result<(), BoxError> {
        Ok(())
    }
    fn write(&mut self, buf: &[u8]) -> Result<usize, BoxError> {
        Ok(buf.len())
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        buf.fill(0);
        Ok(buf.len())
    }
    fn smbus_receive_byte(&mut self) -> Result<u8, BoxError> {
        Ok(0)
    }
    fn smbus_read_word(&mut self, _command: u8) -> Result<u16, BoxError> {
        Ok(0)
    }
}

#[derive(Debug, Default)]
struct Script {
    failing: HashSet<u16>,
    status_bytes: VecDeque<u8>,
    frames: VecDeque<[u8; 4]>,
    words: VecDeque<u16>,
    writes: Vec<(u16, Vec<u8>)>,
    address: u16,
}

/// Bus replaying queued responses. Status polls fall back to an idle byte
/// once the queue is empty; frame and word reads fail instead.
#[derive(Debug, Default, Clone)]
pub struct ScriptedBus {
    script: Arc<Mutex<Script>>,
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Selecting this address fails.
    pub fn failing_address(self, address: u16) -> Self {
        self.lock().failing.insert(address);
        self
    }

    pub fn status_bytes(self, bytes: impl IntoIterator<Item = u8>) -> Self {
        self.lock().status_bytes.extend(bytes);
        self
    }

    pub fn frame(self, frame: [u8; 4]) -> Self {
        self.lock().frames.push_back(frame);
        self
    }

    pub fn word(self, word: u16) -> Self {
        self.lock().words.push_back(word);
        self
    }

    /// Every write so far, tagged with the selected address.
    pub fn writes(&self) -> Vec<(u16, Vec<u8>)> {
        self.lock().writes.clone()
    }
}

fn scripted_err(what: &str) -> BoxError {
    Box::new(std::io::Error::other(format!("script exhausted: {what}")))
}

impl I2cBus for ScriptedBus {
    fn set_slave_address(&mut self, address: u16) -> Result<(), BoxError> {
        let mut s = self.lock();
        if s.failing.contains(&address) {
            return Err(Box::new(std::io::Error::other(format!(
                "cannot select 0x{address:02x}"
            ))));
        }
        s.address = address;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, BoxError> {
        let mut s = self.lock();
        let addr = s.address;
        s.writes.push((addr, buf.to_vec()));
        Ok(buf.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        let frame = self.lock().frames.pop_front().ok_or_else(|| scripted_err("frame"))?;
        let n = buf.len().min(frame.len());
        buf[..n].copy_from_slice(&frame[..n]);
        Ok(n)
    }

    fn smbus_receive_byte(&mut self) -> Result<u8, BoxError> {
        Ok(self.lock().status_bytes.pop_front().unwrap_or(0x40))
    }

    fn smbus_read_word(&mut self, _command: u8) -> Result<u16, BoxError> {
        self.lock().words.pop_front().ok_or_else(|| scripted_err("word"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinCall {
    Duty(u8),
    Direction(bool),
    Release,
}

/// Motor pins that record every call.
#[derive(Debug, Default, Clone)]
pub struct SpyPins {
    calls: Arc<Mutex<Vec<PinCall>>>,
}

impl SpyPins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PinCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, c: PinCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(c);
    }
}

impl MotorPins for SpyPins {
    fn set_duty_percent(&mut self, duty: u8) -> Result<(), BoxError> {
        self.push(PinCall::Duty(duty));
        Ok(())
    }
    fn set_direction(&mut self, high: bool) -> Result<(), BoxError> {
        self.push(PinCall::Direction(high));
        Ok(())
    }
    fn release(&mut self) -> Result<(), BoxError> {
        self.push(PinCall::Release);
        Ok(())
    }
}
