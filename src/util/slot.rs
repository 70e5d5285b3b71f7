use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::time::Duration;

/// Outcome of offering a value to the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Delivered,
    /// A value was already pending; this one merges into it.
    Coalesced,
    Closed,
}

/// Outcome of waiting on the slot with a deadline.
#[derive(Debug, PartialEq, Eq)]
pub enum Wait<T> {
    Ready(T),
    TimedOut,
    Closed,
}

/// Producer half of a one-slot coalescing channel. Never blocks.
pub struct SlotSender<T> {
    tx: SyncSender<T>,
}

/// Consumer half of a one-slot coalescing channel.
pub struct SlotReceiver<T> {
    rx: Receiver<T>,
}

/// Create a channel that holds at most one pending value.
///
/// Bursts collapse into "something happened since the last receive": the
/// consumer sees the oldest pending value, never a count.
pub fn slot<T>() -> (SlotSender<T>, SlotReceiver<T>) {
    let (tx, rx) = mpsc::sync_channel(1);
    (SlotSender { tx }, SlotReceiver { rx })
}

impl<T> SlotSender<T> {
    pub fn offer(&self, value: T) -> Offer {
        match self.tx.try_send(value) {
            Ok(())                           => Offer::Delivered,
            Err(TrySendError::Full(_))       => Offer::Coalesced,
            Err(TrySendError::Disconnected(_)) => Offer::Closed,
        }
    }
}

impl<T> SlotReceiver<T> {
    /// Block until a value arrives. `None` once every sender is gone.
    pub fn wait(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Wait<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(v)                               => Wait::Ready(v),
            Err(RecvTimeoutError::Timeout)      => Wait::TimedOut,
            Err(RecvTimeoutError::Disconnected) => Wait::Closed,
        }
    }
}
