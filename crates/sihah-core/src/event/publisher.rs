//! Publish port for pipeline events.

use std::sync::Arc;

use sihah_types::event::ConversationEvent;

/// Best-effort, non-durable event publishing.
///
/// `publish` must not block and must not fail the caller: delivery to
/// zero subscribers, or to subscribers that have fallen behind, is
/// silently lossy. Consumers recover by re-reading conversation state.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, topic: &str, event: ConversationEvent);

    /// Publish on the event's own topic.
    fn emit(&self, event: ConversationEvent) {
        let topic = event.topic();
        self.publish(&topic, event);
    }
}

impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    fn publish(&self, topic: &str, event: ConversationEvent) {
        (**self).publish(topic, event);
    }
}
