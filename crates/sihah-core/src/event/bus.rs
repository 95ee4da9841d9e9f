//! Broadcast event bus for distributing `ConversationEvent` to multiple
//! subscribers.
//!
//! Built on `tokio::sync::broadcast`, the `EventBus` supports multiple
//! concurrent subscribers. Publishing with no active subscribers is a no-op.

use sihah_types::event::ConversationEvent;
use tokio::sync::broadcast;

use super::publisher::EventPublisher;

/// An event together with the topic it was published on.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub topic: String,
    pub event: ConversationEvent,
}

/// Multi-consumer event bus.
///
/// Cloning the bus clones the sender, allowing multiple producers and
/// consumers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PublishedEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventPublisher for EventBus {
    /// If there are no subscribers, the event is silently dropped.
    fn publish(&self, topic: &str, event: ConversationEvent) {
        let _ = self.sender.send(PublishedEvent {
            topic: topic.to_string(),
            event,
        });
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}
