//! Broadcast-backed implementation of the real-time sink.
//!
//! Engine components publish events here; WebSocket subscribers on the
//! gateway fan them out to dashboard clients. Publishing is best-effort:
//! with no subscriber connected the event is simply dropped.

use funil_core::{Realtime, RealtimeEvent};
use tokio::sync::broadcast;

pub struct BroadcastRealtime {
    tx: broadcast::Sender<RealtimeEvent>,
}

impl BroadcastRealtime {
    pub fn new(tx: broadcast::Sender<RealtimeEvent>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, broadcast::Sender<RealtimeEvent>) {
        let (tx, _) = broadcast::channel(capacity);
        (Self { tx: tx.clone() }, tx)
    }
}

impl Realtime for BroadcastRealtime {
    fn publish(&self, event: RealtimeEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::trace!("no realtime subscribers: {}", e);
        }
    }
}
