//! Bus sensors: last-known readings published through atomics.
//!
//! Only the bus worker writes a sensor's state (from the final step of its
//! measurement transaction); any thread reads it through a [`SensorReader`]
//! without locking.

mod angle;
mod pressure;

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use sprinkler_traits::Clock;

use crate::config::SensorCfg;
use crate::scheduler::{BusScheduler, Completion, Transaction, TransactionId};
use crate::status::HwStatus;

pub use angle::{ANGLE_RANGE, Angle, forward_distance, shortest_diff};
pub use pressure::{Pressure, decode_frame, psi_from_value, value_from_psi};

const NEVER: u64 = u64::MAX;
const ABORT_WAIT_POLLS: u32 = 1_000;

#[derive(Debug)]
struct SensorState {
    epoch: Instant,
    raw: AtomicI32,
    min_raw: AtomicI32,
    rate: AtomicI32,
    measured_ms: AtomicU64,
    busy: AtomicBool,
}

impl SensorState {
    fn new(epoch: Instant) -> Self {
        Self {
            epoch,
            raw: AtomicI32::new(0),
            min_raw: AtomicI32::new(i32::MAX),
            rate: AtomicI32::new(0),
            measured_ms: AtomicU64::new(NEVER),
            busy: AtomicBool::new(false),
        }
    }
}

/// Device protocol of one sensor type.
pub trait SensorProtocol: Send + Sync + 'static {
    const NAME: &'static str;
    const ADDRESS: u16;
    /// Low bits dropped as noise before values reach consumers.
    const TRUNCATE_SHIFT: u32;

    /// Transaction performing one measurement; its last step hands the raw
    /// value to `sink`.
    fn measurement(sink: Publisher) -> Transaction;
}

/// Write side of a sensor's state, owned by measurement steps.
#[derive(Clone)]
pub struct Publisher {
    state: Arc<SensorState>,
    clock: Arc<dyn Clock>,
    shift: u32,
}

impl Publisher {
    pub fn publish(&self, raw: i32) {
        let now_ms = self.clock.ms_since(self.state.epoch);
        let prev_ms = self.state.measured_ms.load(Ordering::Acquire);
        let prev_raw = self.state.raw.load(Ordering::Relaxed);
        if prev_ms != NEVER {
            let dt = now_ms.saturating_sub(prev_ms);
            if dt > 0 {
                let delta = (i64::from(raw) - i64::from(prev_raw)) >> self.shift;
                let rate = delta * 1000 / dt as i64;
                let rate = rate.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
                self.state.rate.store(rate, Ordering::Relaxed);
            }
        }
        self.state.raw.store(raw, Ordering::Relaxed);
        self.state.min_raw.fetch_min(raw, Ordering::Relaxed);
        self.state.measured_ms.store(now_ms, Ordering::Release);
    }
}

/// Lock-free view of a sensor's last measurement.
#[derive(Clone)]
pub struct SensorReader {
    state: Arc<SensorState>,
    clock: Arc<dyn Clock>,
    shift: u32,
    stale_after: Duration,
}

impl SensorReader {
    /// Last value, noise bits dropped.
    pub fn value(&self) -> i32 {
        self.state.raw.load(Ordering::Acquire) >> self.shift
    }

    /// Lowest value seen so far (the ambient baseline for pressure).
    pub fn min(&self) -> Option<i32> {
        if self.last_measurement_ms().is_none() {
            return None;
        }
        Some(self.state.min_raw.load(Ordering::Acquire) >> self.shift)
    }

    /// Change of the truncated value per second.
    pub fn rate(&self) -> i32 {
        self.state.rate.load(Ordering::Acquire)
    }

    /// Milliseconds since the sensor was created, at the last measurement.
    pub fn last_measurement_ms(&self) -> Option<u64> {
        match self.state.measured_ms.load(Ordering::Acquire) {
            NEVER => None,
            ms => Some(ms),
        }
    }

    /// True until the first measurement and whenever the last one is too old.
    pub fn is_stale(&self) -> bool {
        let Some(at) = self.last_measurement_ms() else {
            return true;
        };
        let now = self.clock.ms_since(self.state.epoch);
        now.saturating_sub(at) > self.stale_after.as_millis() as u64
    }
}

/// Bookkeeping for the sensor's outstanding transaction. `ticket` numbers
/// requests; `finished` is the last ticket whose side-effect has run, so a
/// request that completes before `submit` returns never records its id.
#[derive(Debug, Default)]
struct Inflight {
    ticket: u64,
    finished: u64,
    id: Option<TransactionId>,
}

/// A sensor on the shared bus.
///
/// At most one transaction per sensor is in flight; a request made while one
/// is outstanding completes immediately with `Failure` (its completion
/// side-effect still runs, on the caller's thread).
pub struct SensorDriver<P: SensorProtocol> {
    scheduler: Arc<BusScheduler>,
    reader: SensorReader,
    notify_interval: Duration,
    inflight: Arc<Mutex<Inflight>>,
    _protocol: PhantomData<fn() -> P>,
}

fn lock_inflight(m: &Mutex<Inflight>) -> std::sync::MutexGuard<'_, Inflight> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub type PressureSensor = SensorDriver<Pressure>;
pub type AngleSensor = SensorDriver<Angle>;

impl<P: SensorProtocol> SensorDriver<P> {
    pub fn new(scheduler: Arc<BusScheduler>, clock: Arc<dyn Clock>, cfg: &SensorCfg) -> Self {
        let state = Arc::new(SensorState::new(clock.now()));
        Self {
            scheduler,
            reader: SensorReader {
                state,
                clock,
                shift: P::TRUNCATE_SHIFT,
                stale_after: Duration::from_millis(cfg.stale_ms),
            },
            notify_interval: Duration::from_millis(cfg.notify_interval_ms),
            inflight: Arc::default(),
            _protocol: PhantomData,
        }
    }

    pub fn reader(&self) -> SensorReader {
        self.reader.clone()
    }

    fn publisher(&self) -> Publisher {
        Publisher {
            state: self.reader.state.clone(),
            clock: self.reader.clock.clone(),
            shift: P::TRUNCATE_SHIFT,
        }
    }

    pub fn last_value(&self) -> i32 {
        self.reader.value()
    }

    pub fn min_value(&self) -> Option<i32> {
        self.reader.min()
    }

    pub fn last_rate(&self) -> i32 {
        self.reader.rate()
    }

    pub fn is_stale(&self) -> bool {
        self.reader.is_stale()
    }

    /// One measurement.
    pub fn read_async(&self) -> Completion {
        self.submit(P::measurement(self.publisher()), |_| {})
    }

    /// Measure repeatedly until `predicate` returns something other than
    /// `Repeat`; `on_complete` runs on the bus thread with the final status.
    pub fn notify_when(
        &self,
        mut predicate: impl FnMut(&SensorReader) -> HwStatus + Send + 'static,
        on_complete: impl FnOnce(HwStatus) + Send + 'static,
    ) -> Completion {
        let reader = self.reader();
        let txn = P::measurement(self.publisher())
            .repeat_while(move || predicate(&reader), self.notify_interval);
        self.submit(txn, on_complete)
    }

    fn submit(
        &self,
        txn: Transaction,
        on_complete: impl FnOnce(HwStatus) + Send + 'static,
    ) -> Completion {
        let state = &self.reader.state;
        if state
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(sensor = P::NAME, "request rejected: measurement in flight");
            on_complete(HwStatus::Failure);
            return Completion::ready(HwStatus::Failure);
        }
        let ticket = {
            let mut inflight = lock_inflight(&self.inflight);
            inflight.ticket += 1;
            inflight.id = None;
            inflight.ticket
        };
        let release = state.clone();
        let slot = self.inflight.clone();
        let txn = txn.on_complete(move |status| {
            {
                let mut inflight = lock_inflight(&slot);
                inflight.finished = ticket;
                if inflight.ticket == ticket {
                    inflight.id = None;
                }
            }
            release.busy.store(false, Ordering::Release);
            on_complete(status);
        });
        let completion = self.scheduler.submit(txn);
        let mut inflight = lock_inflight(&self.inflight);
        if inflight.ticket == ticket && inflight.finished != ticket {
            inflight.id = completion.transaction_id();
        }
        drop(inflight);
        completion
    }

    /// Cancel the outstanding transaction, if any, and wait until the sensor
    /// accepts requests again.
    pub fn abort(&self) -> bool {
        let id = lock_inflight(&self.inflight).id.take();
        if !id.is_some_and(|id| self.scheduler.abort(id)) {
            return false;
        }
        let busy = &self.reader.state.busy;
        for _ in 0..ABORT_WAIT_POLLS {
            if !busy.load(Ordering::Acquire) {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Blocking read. `None` when the measurement failed.
    pub fn fetch(&self) -> Option<i32> {
        let status = self.read_async().wait();
        if status.is_success() {
            Some(self.reader.value())
        } else {
            tracing::warn!(sensor = P::NAME, %status, "measurement failed");
            None
        }
    }

    /// Last value, measured first if stale. `None` if still stale afterwards.
    pub fn fetch_if_stale(&self) -> Option<i32> {
        if self.reader.is_stale() {
            let status = self.read_async().wait();
            tracing::trace!(sensor = P::NAME, %status, "refreshed stale reading");
        }
        if self.reader.is_stale() {
            None
        } else {
            Some(self.reader.value())
        }
    }
}
