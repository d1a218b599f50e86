//! Ordered, bounded queue of publish requests feeding the cloud sync loop.

use std::fmt;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};

pub const QUEUE_CAPACITY: usize = 50;

/// Which slice of local state to publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublishIntent {
    Weather,
    Temperature,
    Humidity,
    Light,
    Alert,
    Ip,
    /// Fetch the shadow of the given thing.
    Get(u8),
}

impl PublishIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishIntent::Weather => "weather",
            PublishIntent::Temperature => "temperature",
            PublishIntent::Humidity => "humidity",
            PublishIntent::Light => "light",
            PublishIntent::Alert => "alert",
            PublishIntent::Ip => "ip",
            PublishIntent::Get(_) => "get",
        }
    }
}

impl fmt::Display for PublishIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishIntent::Get(thing) => write!(f, "get(Thing_{thing:02})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Multi-producer, single-consumer FIFO. Cloning shares the same queue.
#[derive(Debug, Clone)]
pub struct PublishQueue {
    tx: Sender<PublishIntent>,
    rx: Receiver<PublishIntent>,
}

impl Default for PublishQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishQueue {
    pub fn new() -> Self {
        Self::with_capacity(QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity);
        Self { tx, rx }
    }

    /// Blocking send for task context; waits until a slot frees up.
    pub fn send(&self, intent: PublishIntent) {
        // The queue owns a receiver, so the channel can never be disconnected.
        if self.tx.send(intent).is_err() {
            log::error!("publish queue disconnected; dropped {intent}");
        }
    }

    /// Non-blocking send for interrupt-style producers. A full queue drops the
    /// intent; returns whether it was enqueued.
    pub fn try_send(&self, intent: PublishIntent) -> bool {
        match self.tx.try_send(intent) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::trace!("publish queue full; dropped {intent}");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Next intent in arrival order, or `None` if nothing arrives within `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<PublishIntent> {
        match self.rx.recv_timeout(timeout) {
            Ok(intent) => Some(intent),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<PublishIntent> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
