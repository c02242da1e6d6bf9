use crate::event_filter::EventFilter;
use crate::protocol::EventMessage;
use tokio::sync::broadcast;
use tracing::trace;

/// Outbound half of the transport between the page and the frontend.
///
/// Delivery is fire-and-forget: a domain never waits for acknowledgment and
/// never learns whether anyone received the event.
pub trait Channel: Send + Sync {
    fn deliver(&self, event: EventMessage);
}

/// In-process event bus fanning domain events out to any number of subscribers.
#[derive(Clone)]
pub struct BroadcastChannel {
    event_tx: broadcast::Sender<EventMessage>,
}

impl BroadcastChannel {
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self { event_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventMessage> {
        self.event_tx.subscribe()
    }

    pub fn on_domain(&self, domain: &str) -> EventFilter {
        EventFilter::new(self.subscribe(), domain)
    }
}

impl Channel for BroadcastChannel {
    fn deliver(&self, event: EventMessage) {
        trace!("Delivering {}", event.method);
        // No subscribers is not an error for fire-and-forget events
        let _ = self.event_tx.send(event);
    }
}
