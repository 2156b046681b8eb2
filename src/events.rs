//! Live hub for fanning newly ingested events out to stream subscribers
//!
//! Each subscriber owns a bounded queue. Publishing never blocks: a
//! subscriber whose queue is full misses the frame, and a subscriber whose
//! receiver has been dropped is removed from the registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Serialized JSON payload of one stream frame
pub type Frame = Arc<str>;

#[derive(Clone)]
pub struct LiveHub {
    subscribers: Arc<Mutex<HashMap<Uuid, mpsc::Sender<Frame>>>>,
    buffer: usize,
}

impl LiveHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            buffer: buffer.max(1),
        }
    }

    /// Register a new subscriber. It is unregistered when the returned
    /// subscription is dropped.
    pub fn register(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();
        self.lock().insert(id, tx);
        debug!(subscriber = %id, "Live subscriber registered");

        Subscription {
            id,
            rx,
            hub: self.clone(),
        }
    }

    pub fn unregister(&self, id: Uuid) {
        if self.lock().remove(&id).is_some() {
            debug!(subscriber = %id, "Live subscriber unregistered");
        }
    }

    /// Push a frame to every current subscriber. Returns how many accepted it.
    pub fn publish(&self, payload: impl Into<Frame>) -> usize {
        let frame: Frame = payload.into();
        let mut delivered = 0;

        self.lock().retain(|id, tx| match tx.try_send(frame.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(subscriber = %id, "Live subscriber lagging, frame dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        delivered
    }

    /// Drop every subscriber's sender, ending their streams
    pub fn close(&self) {
        let mut subscribers = self.lock();
        if !subscribers.is_empty() {
            debug!(count = subscribers.len(), "Closing live subscribers");
        }
        subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, mpsc::Sender<Frame>>> {
        // The map is only mutated by short non-panicking sections; recover from poisoning
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Receiving side of one registered subscriber
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<Frame>,
    hub: LiveHub,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}
