// src/events.rs
//! Publish/subscribe distribution of accepted snapshots

use crate::location::Snapshot;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};
use tokio::sync::mpsc;
use tracing::warn;

/// What subscribers receive
#[derive(Debug, Clone)]
pub enum SnapshotEvent {
    Snapshot(Arc<Snapshot>),
    /// The connection failed for good; no further snapshots follow from it
    ConnectionLost { reason: String },
}

impl SnapshotEvent {
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            SnapshotEvent::Snapshot(s) => Some(s),
            SnapshotEvent::ConnectionLost { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SnapshotEvent::ConnectionLost { .. })
    }
}

pub type SnapshotHandler = Arc<dyn Fn(&SnapshotEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

#[derive(Clone)]
enum Subscriber {
    Callback(SnapshotHandler),
    Channel(mpsc::Sender<SnapshotEvent>),
}

/// Fan-out of snapshot events to subscribers.
///
/// Callback handlers run on the producer in subscription order; a failing
/// or panicking handler is logged and skipped. Channel subscribers get a
/// bounded queue and the producer waits for room, so a slow consumer slows
/// the feed instead of losing events. Cloning yields another handle to the
/// same bus.
#[derive(Clone, Default)]
pub struct SnapshotEventBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionHandle, Subscriber)>>,
}

impl SnapshotEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. It sees events published after this call only.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn(&SnapshotEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add(Subscriber::Callback(Arc::new(handler)))
    }

    /// Register a bounded channel subscriber. Dropping the receiver
    /// unsubscribes it on the next publish.
    pub fn subscribe_channel(
        &self,
        capacity: usize,
    ) -> (SubscriptionHandle, mpsc::Receiver<SnapshotEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (self.add(Subscriber::Channel(tx)), rx)
    }

    /// Returns false if the handle was not subscribed
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subs = self.write();
        let before = subs.len();
        subs.retain(|(h, _)| *h != handle);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.read().len()
    }

    /// Deliver `event` to every current subscriber, in subscription order.
    /// Returns how many subscribers accepted it.
    pub async fn publish(&self, event: SnapshotEvent) -> usize {
        let targets: Vec<(SubscriptionHandle, Subscriber)> = self.read().clone();
        let mut delivered = 0;

        for (handle, subscriber) in targets {
            match subscriber {
                Subscriber::Callback(handler) => {
                    match panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                        Ok(Ok(())) => delivered += 1,
                        Ok(Err(e)) => warn!("Snapshot handler {:?} failed: {:#}", handle, e),
                        Err(_) => warn!("Snapshot handler {:?} panicked", handle),
                    }
                }
                Subscriber::Channel(tx) => {
                    if tx.send(event.clone()).await.is_ok() {
                        delivered += 1;
                    } else {
                        self.unsubscribe(handle);
                    }
                }
            }
        }

        delivered
    }

    fn add(&self, subscriber: Subscriber) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.write().push((handle, subscriber));
        handle
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<(SubscriptionHandle, Subscriber)>> {
        self.inner.subscribers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<(SubscriptionHandle, Subscriber)>> {
        self.inner.subscribers.write().unwrap_or_else(|e| e.into_inner())
    }
}
