use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::sweep_types::SweepEvent;

/// Fan-out of [`SweepEvent`]s to any number of subscribers
///
/// Each subscriber gets every event emitted after it subscribed, in order.
/// Subscribers whose receiver was dropped are pruned on the next emit.
#[derive(Clone, Default)]
pub struct SweepEventBus {
    subscribers: Arc<Mutex<Vec<UnboundedSender<SweepEvent>>>>,
}

impl SweepEventBus {
    /// Create a bus with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> UnboundedReceiver<SweepEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber
    pub fn emit(&self, event: SweepEvent) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscribers as of the last emit
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
