//! Fan-out of push messages to subscribers.
//!
//! Each subscriber is a bounded channel. Publishing never blocks: a full or
//! disconnected channel evicts that subscriber and nobody else. The receiving
//! side (a socket writer thread in the daemon) does the slow IO.

use sage_avatar_protocol::PushMessage;
use serde::Serialize;
use std::fmt;
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// The receiving half handed to a new subscriber.
pub struct Subscription {
    id: SubscriberId,
    receiver: Receiver<PushMessage>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn recv(&self) -> Option<PushMessage> {
        self.receiver.recv().ok()
    }

    /// `None` on timeout or once the broadcaster has dropped this subscriber.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<PushMessage> {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<PushMessage> {
        self.receiver.try_recv().ok()
    }
}

struct Slot {
    id: SubscriberId,
    sender: SyncSender<PushMessage>,
}

pub struct Broadcaster {
    subscribers: Vec<Slot>,
    next_id: u64,
    queue_depth: usize,
}

impl Broadcaster {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 0,
            queue_depth: queue_depth.max(1),
        }
    }

    /// Registers a subscriber whose first message is `catch_up`.
    pub fn subscribe(&mut self, catch_up: PushMessage) -> Subscription {
        let (sender, receiver) = sync_channel(self.queue_depth);
        self.next_id += 1;
        let id = SubscriberId(self.next_id);

        // The channel is empty and holds at least one message.
        let _ = sender.try_send(catch_up);
        self.subscribers.push(Slot { id, sender });
        info!(
            subscriber = %id,
            subscribers = self.subscribers.len(),
            "Subscriber joined"
        );

        Subscription { id, receiver }
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|slot| slot.id != id);
        let removed = self.subscribers.len() != before;
        if removed {
            info!(
                subscriber = %id,
                subscribers = self.subscribers.len(),
                "Subscriber left"
            );
        }
        removed
    }

    /// Sends `message` to every subscriber, returning how many remain.
    pub fn publish(&mut self, message: &PushMessage) -> usize {
        self.subscribers
            .retain(|slot| match slot.sender.try_send(message.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = %slot.id, "Subscriber lagging; dropping it");
                    false
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!(subscriber = %slot.id, "Subscriber disconnected");
                    false
                }
            });
        self.subscribers.len()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_DEPTH)
    }
}
