//! Conversation and message types for Sihah.
//!
//! A conversation belongs to one agent and holds an append-only,
//! strictly ordered list of messages. Status only moves forward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

pub use crate::llm::MessageRole;

/// Opaque key/value metadata attached to conversations and messages.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Channel tag used when the first turn does not name one.
pub const DEFAULT_CHANNEL: &str = "web";

/// Lifecycle status of a conversation.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (status IN ('active', 'paused', 'ended', 'transferred'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Active,
    Paused,
    Ended,
    Transferred,
}

impl ConversationStatus {
    /// Ended and transferred conversations never change status again.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConversationStatus::Ended | ConversationStatus::Transferred)
    }

    /// Whether a new turn may be processed in this status.
    pub fn accepts_turns(self) -> bool {
        self == ConversationStatus::Active
    }

    /// Forward-only transition table.
    ///
    /// `Active` may move to any other status, `Paused` may only move to a
    /// terminal status, and terminal statuses are final.
    pub fn can_transition_to(self, next: ConversationStatus) -> bool {
        use ConversationStatus::*;
        matches!(
            (self, next),
            (Active, Paused) | (Active, Ended) | (Active, Transferred) | (Paused, Ended) | (Paused, Transferred)
        )
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationStatus::Active => write!(f, "active"),
            ConversationStatus::Paused => write!(f, "paused"),
            ConversationStatus::Ended => write!(f, "ended"),
            ConversationStatus::Transferred => write!(f, "transferred"),
        }
    }
}

impl FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ConversationStatus::Active),
            "paused" => Ok(ConversationStatus::Paused),
            "ended" => Ok(ConversationStatus::Ended),
            "transferred" => Ok(ConversationStatus::Transferred),
            other => Err(format!("invalid conversation status: '{other}'")),
        }
    }
}

/// A conversation between an end user and an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub channel: String,
    pub status: ConversationStatus,
    #[serde(default)]
    pub metadata: Metadata,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// A fresh `Active` conversation, as created on its first turn.
    pub fn new(id: Uuid, agent_id: Uuid, channel: impl Into<String>) -> Self {
        Self {
            id,
            agent_id,
            channel: channel.into(),
            status: ConversationStatus::Active,
            metadata: Metadata::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// A single persisted message within a conversation.
///
/// `seq` is assigned by the store and is strictly increasing within a
/// conversation; it is the ordering key, not `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub seq: i64,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// A message that has not been persisted yet.
///
/// The store assigns `seq` on append.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    pub fn new(role: MessageRole, content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: Uuid::now_v7(),
            role,
            content: content.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}
