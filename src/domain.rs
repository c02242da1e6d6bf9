use crate::channel::Channel;
use crate::protocol::EventMessage;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Namespaced handle a domain uses to push events toward the [`Channel`].
#[derive(Clone)]
pub struct DomainSender {
    namespace: &'static str,
    channel: Arc<dyn Channel>,
}

impl DomainSender {
    pub fn new(namespace: &'static str, channel: Arc<dyn Channel>) -> Self {
        Self { namespace, channel }
    }

    /// Qualifies `event` with the namespace (unless it already carries one)
    /// and hands it to the channel without waiting.
    pub fn send<P: Serialize>(&self, event: &str, params: P) {
        let method = if event.contains('.') {
            event.to_string()
        } else {
            format!("{}.{}", self.namespace, event)
        };

        match serde_json::to_value(params) {
            Ok(params) => self.channel.deliver(EventMessage { method, params }),
            Err(e) => warn!("Dropping {} event, params failed to serialize: {}", method, e),
        }
    }
}

/// A named group of protocol operations and events.
pub trait ProtocolDomain {
    const NAMESPACE: &'static str;

    fn sender(&self) -> &DomainSender;

    fn send<P: Serialize>(&self, event: &str, params: P) {
        self.sender().send(event, params);
    }
}
