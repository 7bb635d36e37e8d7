//! Hand-off for producers running outside the tick context.
//!
//! Sensors and network peers push [`SignalUpdate`]s through an
//! [`UpdateSender`]; the tick owner drains them with
//! [`crate::Runtime::drain`] right before calling [`crate::Runtime::tick`].

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};

use crate::signal::SignalId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalUpdate {
    pub signal: SignalId,
    pub value: f32,
}

/// Bounded queue of pending signal writes.
#[derive(Debug)]
pub struct UpdateQueue {
    sender: Sender<SignalUpdate>,
    receiver: Receiver<SignalUpdate>,
}

impl UpdateQueue {
    pub fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Self { sender, receiver }
    }

    pub fn sender(&self) -> UpdateSender {
        UpdateSender {
            sender: self.sender.clone(),
        }
    }

    /// Next pending update, without blocking.
    pub fn try_recv(&self) -> Option<SignalUpdate> {
        match self.receiver.try_recv() {
            Ok(update) => Some(update),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Producer side of an [`UpdateQueue`]. Cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct UpdateSender {
    sender: Sender<SignalUpdate>,
}

impl UpdateSender {
    /// Queues a write without blocking. Returns `false` when the queue is full
    /// or the runtime side is gone; the update is dropped in that case.
    pub fn send(&self, signal: SignalId, value: f32) -> bool {
        match self.sender.try_send(SignalUpdate { signal, value }) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }
}
