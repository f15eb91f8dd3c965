use std::fmt;
use std::time::Duration;

use sprinkler_traits::I2cBus;

use super::completion::CompletionSender;
use crate::status::HwStatus;

/// Most command steps a single transaction may carry.
pub const MAX_STEPS: usize = 3;

pub type Command = Box<dyn FnMut(&mut dyn I2cBus) -> Step + Send>;
pub type Predicate = Box<dyn FnMut() -> HwStatus + Send>;
pub type OnComplete = Box<dyn FnOnce(HwStatus) + Send>;

/// Handle of a submitted transaction. The generation makes ids of freed
/// arena slots harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index, self.generation)
    }
}

/// Result of one command step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub status: HwStatus,
    /// Wait before the next step (or the retry, for `Repeat`).
    pub delay: Duration,
}

impl Step {
    pub fn next() -> Self {
        Self::next_after(Duration::ZERO)
    }

    pub fn next_after(delay: Duration) -> Self {
        Self {
            status: HwStatus::Next,
            delay,
        }
    }

    pub fn repeat_after(delay: Duration) -> Self {
        Self {
            status: HwStatus::Repeat,
            delay,
        }
    }

    pub fn completed() -> Self {
        Self {
            status: HwStatus::Completed,
            delay: Duration::ZERO,
        }
    }

    pub fn fail(status: HwStatus) -> Self {
        Self {
            status,
            delay: Duration::ZERO,
        }
    }
}

struct Recursion {
    predicate: Predicate,
    interval: Duration,
}

/// Ordered pipeline of bus commands for one device address.
///
/// ```ignore
/// let txn = Transaction::new(0x36)
///     .step(|bus| match bus.smbus_read_word(0x0C) {
///         Ok(_) => Step::next(),
///         Err(_) => Step::fail(HwStatus::CommFailure),
///     })
///     .on_complete(|status| tracing::debug!(%status, "angle read done"));
/// ```
pub struct Transaction {
    address: u16,
    steps: Vec<Command>,
    cursor: usize,
    recursion: Option<Recursion>,
    on_complete: Option<OnComplete>,
    signal: Option<CompletionSender>,
}

/// What the worker does after running a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Advance {
    Reschedule(Duration),
    Finish(HwStatus),
}

impl Transaction {
    pub fn new(address: u16) -> Self {
        Self {
            address,
            steps: Vec::with_capacity(MAX_STEPS),
            cursor: 0,
            recursion: None,
            on_complete: None,
            signal: None,
        }
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn step(mut self, command: impl FnMut(&mut dyn I2cBus) -> Step + Send + 'static) -> Self {
        self.steps.push(Box::new(command));
        self
    }

    pub fn steps(mut self, commands: Vec<Command>) -> Self {
        self.steps.extend(commands);
        self
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Re-run the whole pipeline every `interval` for as long as `predicate`
    /// returns `Repeat`; any other value finishes the transaction with it.
    pub fn repeat_while(
        mut self,
        predicate: impl FnMut() -> HwStatus + Send + 'static,
        interval: Duration,
    ) -> Self {
        self.recursion = Some(Recursion {
            predicate: Box::new(predicate),
            interval,
        });
        self
    }

    /// Side-effect run on the worker thread just before the completion fires.
    pub fn on_complete(mut self, f: impl FnOnce(HwStatus) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub(crate) fn is_valid(&self) -> bool {
        !self.steps.is_empty() && self.steps.len() <= MAX_STEPS
    }

    pub(crate) fn attach(&mut self, signal: CompletionSender) {
        self.signal = Some(signal);
    }

    /// Run the current step. The device address has already been selected.
    pub(crate) fn run_step(&mut self, bus: &mut dyn I2cBus) -> Advance {
        let Some(command) = self.steps.get_mut(self.cursor) else {
            return self.pipeline_done();
        };
        let step = command(bus);
        match step.status {
            HwStatus::Next => {
                self.cursor += 1;
                if self.cursor >= self.steps.len() {
                    self.pipeline_done()
                } else {
                    Advance::Reschedule(step.delay)
                }
            }
            HwStatus::Repeat => Advance::Reschedule(step.delay),
            HwStatus::Completed => self.pipeline_done(),
            terminal => Advance::Finish(terminal),
        }
    }

    fn pipeline_done(&mut self) -> Advance {
        let Some(rec) = self.recursion.as_mut() else {
            return Advance::Finish(HwStatus::Success);
        };
        match (rec.predicate)() {
            HwStatus::Repeat => {
                self.cursor = 0;
                Advance::Reschedule(rec.interval)
            }
            HwStatus::Next | HwStatus::Completed => Advance::Finish(HwStatus::Success),
            other => Advance::Finish(other),
        }
    }

    /// Terminal transition: side-effect first, then the signal.
    pub(crate) fn finish(mut self, status: HwStatus) {
        if let Some(f) = self.on_complete.take() {
            f(status);
        }
        if let Some(signal) = self.signal.take() {
            signal.fire(status);
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("address", &format_args!("0x{:02x}", self.address))
            .field("steps", &self.steps.len())
            .field("cursor", &self.cursor)
            .field("recursive", &self.recursion.is_some())
            .finish()
    }
}
