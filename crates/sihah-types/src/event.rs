//! Event types fanned out to real-time subscribers.
//!
//! Events are best-effort and non-durable. Every variant is Clone + Send +
//! Sync for use with tokio broadcast channels. Subscribers that miss events
//! recover by re-reading conversation state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::{ConversationMessage, ConversationStatus};
use crate::error::TurnErrorKind;

/// Events emitted by the turn pipeline and the ingestion workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// A turn has been accepted and is being processed.
    TurnStarted { conversation_id: Uuid },

    /// A turn was persisted. Carries the assistant message.
    TurnCompleted {
        conversation_id: Uuid,
        message: ConversationMessage,
    },

    /// A turn failed and nothing was persisted.
    TurnFailed {
        conversation_id: Uuid,
        kind: TurnErrorKind,
        error: String,
    },

    /// A conversation moved to a new status.
    ConversationStatusChanged {
        conversation_id: Uuid,
        from: ConversationStatus,
        to: ConversationStatus,
    },

    /// A document finished ingesting into an agent's knowledge base.
    DocumentIngested {
        agent_id: Uuid,
        document_id: String,
        chunks: usize,
    },
}

impl ConversationEvent {
    /// Publish topic for this event.
    pub fn topic(&self) -> String {
        match self {
            ConversationEvent::TurnStarted { conversation_id }
            | ConversationEvent::TurnCompleted {
                conversation_id, ..
            }
            | ConversationEvent::TurnFailed {
                conversation_id, ..
            }
            | ConversationEvent::ConversationStatusChanged {
                conversation_id, ..
            } => format!("conversation.{conversation_id}"),
            ConversationEvent::DocumentIngested { agent_id, .. } => {
                format!("agent.{agent_id}.knowledge")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagged_serialization() {
        let id = Uuid::now_v7();
        let event = ConversationEvent::ConversationStatusChanged {
            conversation_id: id,
            from: ConversationStatus::Active,
            to: ConversationStatus::Transferred,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "conversation_status_changed");
        assert_eq!(json["to"], "transferred");
        assert_eq!(event.topic(), format!("conversation.{id}"));
    }

    #[test]
    fn test_failed_event_carries_kind() {
        let event = ConversationEvent::TurnFailed {
            conversation_id: Uuid::now_v7(),
            kind: TurnErrorKind::RetryLater,
            error: "timeout".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "retry_later");
    }

    #[test]
    fn test_ingest_topic_is_agent_scoped() {
        let agent = Uuid::now_v7();
        let event = ConversationEvent::DocumentIngested {
            agent_id: agent,
            document_id: "faq".into(),
            chunks: 4,
        };
        assert_eq!(event.topic(), format!("agent.{agent}.knowledge"));
    }
}
