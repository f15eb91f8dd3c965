use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use sprinkler_traits::I2cBus;

use super::completion::Completion;
use super::transaction::{Advance, Transaction, TransactionId};
use crate::error::BuildError;
use crate::status::HwStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Task {
    due: Instant,
    seq: u64,
    id: TransactionId,
}

struct Entry {
    address: u16,
    aborted: bool,
    /// Sequence number of the heap task currently owning this entry; older
    /// heap tasks for the same id are stale and skipped.
    ticket: u64,
    /// Taken out while the worker runs a step.
    body: Option<Transaction>,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Default)]
struct State {
    heap: BinaryHeap<Reverse<Task>>,
    slots: Vec<Slot>,
    free: Vec<u32>,
    seq: u64,
    live: usize,
    quit: bool,
}

impl State {
    fn entry_mut(&mut self, id: TransactionId) -> Option<&mut Entry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    fn insert(&mut self, entry: Entry) -> TransactionId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return TransactionId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        TransactionId {
            index,
            generation: 0,
        }
    }

    fn remove(&mut self, id: TransactionId) -> Option<Entry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(entry)
    }

    /// Queue `id` at `due`, superseding any earlier heap task for it.
    fn schedule(&mut self, id: TransactionId, due: Instant) {
        self.seq += 1;
        let seq = self.seq;
        if let Some(e) = self.entry_mut(id) {
            e.ticket = seq;
            self.heap.push(Reverse(Task { due, seq, id }));
        }
    }

    /// Mark every other live transaction for `address` aborted. Queued ones
    /// are moved to the front so the `Abort` is delivered promptly.
    fn supersede(&mut self, address: u16, now: Instant) {
        let mut requeue = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(e) = slot.entry.as_mut() else {
                continue;
            };
            if e.address != address || e.aborted {
                continue;
            }
            e.aborted = true;
            if e.body.is_some() {
                requeue.push(TransactionId {
                    index: index as u32,
                    generation: slot.generation,
                });
            }
        }
        for id in requeue {
            tracing::debug!(%id, address = format_args!("0x{address:02x}"), "superseded");
            self.schedule(id, now);
        }
    }
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owner of the I²C bus and its worker thread.
///
/// Submitting a transaction for an address aborts any other live transaction
/// for the same address. Tasks run in due-time order; equal due times run in
/// submission order.
pub struct BusScheduler {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    worker_id: Option<ThreadId>,
}

impl BusScheduler {
    pub fn spawn<B: I2cBus + 'static>(bus: B) -> Result<Self, BuildError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            wake: Condvar::new(),
        });
        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name("i2c-bus".into())
            .spawn(move || worker_loop(&worker_shared, Box::new(bus)))
            .map_err(|e| BuildError::Spawn(e.to_string()))?;
        let worker_id = Some(handle.thread().id());
        tracing::debug!("bus scheduler started");
        Ok(Self {
            shared,
            worker: Some(handle),
            worker_id,
        })
    }

    pub fn submit(&self, mut txn: Transaction) -> Completion {
        if !txn.is_valid() {
            tracing::warn!(?txn, "rejected transaction with bad step count");
            return Completion::ready(HwStatus::Failure);
        }
        let (sender, completion) = Completion::pair();
        txn.attach(sender);

        let mut st = self.shared.lock();
        if st.quit {
            drop(st);
            txn.finish(HwStatus::Abort);
            return completion;
        }
        let now = Instant::now();
        let address = txn.address();
        st.supersede(address, now);
        let id = st.insert(Entry {
            address,
            aborted: false,
            ticket: 0,
            body: Some(txn),
        });
        st.schedule(id, now);
        drop(st);
        self.shared.wake.notify_one();
        tracing::trace!(%id, address = format_args!("0x{address:02x}"), "submitted");
        completion.with_id(id)
    }

    /// Abort a live transaction. Returns false if it already finished.
    pub fn abort(&self, id: TransactionId) -> bool {
        let mut st = self.shared.lock();
        let queued = match st.entry_mut(id) {
            Some(e) if !e.aborted => {
                e.aborted = true;
                e.body.is_some()
            }
            _ => return false,
        };
        if queued {
            st.schedule(id, Instant::now());
        }
        drop(st);
        self.shared.wake.notify_one();
        true
    }

    /// Number of live (not yet completed) transactions.
    pub fn pending(&self) -> usize {
        self.shared.lock().live
    }
}

impl Drop for BusScheduler {
    fn drop(&mut self) {
        self.shared.lock().quit = true;
        self.shared.wake.notify_all();

        // Dropped from a completion side-effect: the worker exits on its own.
        if self.worker_id == Some(thread::current().id()) {
            return;
        }
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("bus worker joined"),
                Err(e) => tracing::warn!(?e, "bus worker panicked during shutdown"),
            }
        }
    }
}

enum Work {
    Run(TransactionId, Transaction, bool),
    Quit,
}

fn next_work(shared: &Shared) -> Work {
    let mut st = shared.lock();
    loop {
        if st.quit {
            return Work::Quit;
        }
        let Some(Reverse(task)) = st.heap.peek().copied() else {
            st = shared.wake.wait(st).unwrap_or_else(PoisonError::into_inner);
            continue;
        };
        let current = st
            .entry_mut(task.id)
            .is_some_and(|e| e.ticket == task.seq && e.body.is_some());
        if !current {
            st.heap.pop();
            continue;
        }
        let now = Instant::now();
        if task.due > now {
            st = shared
                .wake
                .wait_timeout(st, task.due - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
            continue;
        }
        st.heap.pop();
        if let Some(e) = st.entry_mut(task.id)
            && let Some(body) = e.body.take()
        {
            return Work::Run(task.id, body, e.aborted);
        }
    }
}

fn worker_loop(shared: &Shared, mut bus: Box<dyn I2cBus>) {
    loop {
        let (id, mut body, aborted) = match next_work(shared) {
            Work::Run(id, body, aborted) => (id, body, aborted),
            Work::Quit => break,
        };

        let advance = if aborted {
            Advance::Finish(HwStatus::Abort)
        } else {
            run_one(bus.as_mut(), &mut body)
        };

        match advance {
            Advance::Finish(status) => {
                shared.lock().remove(id);
                tracing::trace!(%id, %status, "transaction finished");
                body.finish(status);
            }
            Advance::Reschedule(delay) => {
                let mut st = shared.lock();
                let now = Instant::now();
                let Some(e) = st.entry_mut(id) else {
                    continue;
                };
                let due = if e.aborted { now } else { now + delay };
                e.body = Some(body);
                st.schedule(id, due);
            }
        }
    }

    // Fail everything still pending so side-effects (motor stops) still run.
    let leftovers: Vec<Transaction> = {
        let mut st = shared.lock();
        st.heap.clear();
        let ids: Vec<TransactionId> = st
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.entry.is_some())
            .map(|(i, s)| TransactionId {
                index: i as u32,
                generation: s.generation,
            })
            .collect();
        ids.into_iter()
            .filter_map(|id| st.remove(id).and_then(|e| e.body))
            .collect()
    };
    if !leftovers.is_empty() {
        tracing::debug!(count = leftovers.len(), "aborting pending transactions on shutdown");
    }
    for txn in leftovers {
        txn.finish(HwStatus::Abort);
    }
    drop(bus);
    tracing::trace!("bus worker exiting cleanly");
}

fn run_one(bus: &mut dyn I2cBus, txn: &mut Transaction) -> Advance {
    let address = txn.address();
    if let Err(e) = bus.set_slave_address(address) {
        tracing::warn!(
            address = format_args!("0x{address:02x}"),
            error = %crate::hw_error::map_hw_error(e.as_ref()),
            "selecting device failed"
        );
        return Advance::Finish(HwStatus::CommFailure);
    }
    txn.run_step(bus)
}
