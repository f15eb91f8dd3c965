use std::cell::OnceCell;
use std::time::Duration;

use crossbeam_channel as xch;

use super::transaction::TransactionId;
use crate::status::HwStatus;

/// Sending half of a one-shot completion.
#[derive(Debug)]
pub struct CompletionSender {
    tx: xch::Sender<HwStatus>,
}

impl CompletionSender {
    pub fn fire(self, status: HwStatus) {
        // Receiver may be gone; nobody is waiting then.
        let _ = self.tx.try_send(status);
    }
}

/// One-shot signal carrying the terminal status of an operation.
///
/// Dropping the sender without firing reads as `Abort`.
#[derive(Debug)]
pub struct Completion {
    rx: xch::Receiver<HwStatus>,
    id: Option<TransactionId>,
    status: OnceCell<HwStatus>,
}

impl Completion {
    pub fn pair() -> (CompletionSender, Self) {
        let (tx, rx) = xch::bounded(1);
        (
            CompletionSender { tx },
            Self {
                rx,
                id: None,
                status: OnceCell::new(),
            },
        )
    }

    /// Already-resolved completion.
    pub fn ready(status: HwStatus) -> Self {
        let (tx, c) = Self::pair();
        tx.fire(status);
        c
    }

    pub(crate) fn with_id(mut self, id: TransactionId) -> Self {
        self.id = Some(id);
        self
    }

    /// Id of the bus transaction behind this completion, if any.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.id
    }

    pub fn wait(self) -> HwStatus {
        if let Some(s) = self.status.get() {
            return *s;
        }
        self.rx.recv().unwrap_or(HwStatus::Abort)
    }

    /// `None` while still pending after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<HwStatus> {
        if let Some(s) = self.status.get() {
            return Some(*s);
        }
        let s = match self.rx.recv_timeout(timeout) {
            Ok(s) => s,
            Err(xch::RecvTimeoutError::Timeout) => return None,
            Err(xch::RecvTimeoutError::Disconnected) => HwStatus::Abort,
        };
        Some(*self.status.get_or_init(|| s))
    }

    pub fn try_status(&self) -> Option<HwStatus> {
        if let Some(s) = self.status.get() {
            return Some(*s);
        }
        let s = match self.rx.try_recv() {
            Ok(s) => s,
            Err(xch::TryRecvError::Empty) => return None,
            Err(xch::TryRecvError::Disconnected) => HwStatus::Abort,
        };
        Some(*self.status.get_or_init(|| s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_resolves_immediately() {
        assert_eq!(Completion::ready(HwStatus::Timeout).wait(), HwStatus::Timeout);
    }

    #[test]
    fn dropped_sender_reads_as_abort() {
        let (tx, c) = Completion::pair();
        drop(tx);
        assert_eq!(c.wait(), HwStatus::Abort);
    }

    #[test]
    fn status_is_sticky_after_first_observation() {
        let (tx, c) = Completion::pair();
        assert_eq!(c.try_status(), None);
        tx.fire(HwStatus::Success);
        assert_eq!(c.wait_timeout(Duration::from_millis(10)), Some(HwStatus::Success));
        assert_eq!(c.try_status(), Some(HwStatus::Success));
        assert_eq!(c.wait(), HwStatus::Success);
    }

    #[test]
    fn fires_from_another_thread() {
        let (tx, c) = Completion::pair();
        std::thread::spawn(move || tx.fire(HwStatus::MaxValueReached));
        assert_eq!(c.wait(), HwStatus::MaxValueReached);
    }
}
