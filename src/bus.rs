use tokio::sync::broadcast;

use crate::events::EngineEvent;

/// Outbound fan-out of engine events (status, recommendations, strategy
/// switches) to any number of consumers. Lagging consumers lose the
/// oldest events rather than backpressuring the pipeline.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Send to all current subscribers. A send with no subscribers is
    /// not an error for the pipeline; the event is simply dropped.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}
