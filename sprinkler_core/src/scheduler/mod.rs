//! Single-threaded execution of device-addressed bus transactions.
//!
//! A [`BusScheduler`] owns the bus handle and one worker thread. Producers
//! build a [`Transaction`] (up to three command steps, optionally repeated
//! while a predicate asks for it) and [`submit`](BusScheduler::submit) it; the
//! returned [`Completion`] delivers the terminal [`HwStatus`](crate::HwStatus)
//! exactly once.

mod bus;
mod completion;
mod transaction;

pub use bus::BusScheduler;
pub use completion::{Completion, CompletionSender};
pub use transaction::{Command, MAX_STEPS, OnComplete, Predicate, Step, Transaction, TransactionId};
