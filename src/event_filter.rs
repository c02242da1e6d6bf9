use std::pin::Pin;
use std::task::{Context, Poll};
use crate::protocol::EventMessage;
use tokio_stream::{Stream, wrappers::BroadcastStream};

/// Stream over the events of a single domain.
pub struct EventFilter {
    inner: BroadcastStream<EventMessage>,
    domain: String,
}

impl EventFilter {
    pub fn new(receiver: tokio::sync::broadcast::Receiver<EventMessage>, domain: &str) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            domain: domain.to_string(),
        }
    }
}

impl Stream for EventFilter {
    type Item = EventMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if event.domain() == Some(self.domain.as_str()) {
                        return Poll::Ready(Some(event));
                    }
                    continue;
                }
                // Lagged: skip to the next fresh message
                Poll::Ready(Some(Err(_))) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
