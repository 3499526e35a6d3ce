use crate::state::Snapshot;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

/// Fan-out of snapshots from the poll loop to connected clients.
///
/// Each subscription buffers at most `capacity` snapshots; a client that falls
/// further behind skips the oldest ones instead of slowing the publisher.
#[derive(Clone)]
pub struct SnapshotHub {
    tx: broadcast::Sender<Arc<Snapshot>>,
}

pub struct Subscription {
    rx: broadcast::Receiver<Arc<Snapshot>>,
}

impl SnapshotHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of subscribers the snapshot was handed to.
    pub fn publish(&self, snapshot: Snapshot) -> usize {
        self.tx.send(Arc::new(snapshot)).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Subscription {
    /// Next snapshot, or `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<Arc<Snapshot>> {
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagging, dropped snapshots");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
