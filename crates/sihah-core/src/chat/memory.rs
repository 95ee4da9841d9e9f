//! In-memory `ConversationRepository`.
//!
//! All state sits behind one async mutex, so every operation is atomic.
//! `fail_appends` lets tests simulate a store outage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use sihah_types::chat::{Conversation, ConversationMessage, ConversationStatus, NewMessage};
use sihah_types::error::RepositoryError;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::repository::ConversationRepository;

#[derive(Debug, Default)]
struct Entry {
    conversation: Option<Conversation>,
    messages: Vec<ConversationMessage>,
}

#[derive(Debug, Default)]
pub struct InMemoryConversationRepository {
    entries: Mutex<HashMap<Uuid, Entry>>,
    fail_appends: AtomicBool,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `append_turn` fail with a connection error.
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

fn materialize(conversation_id: Uuid, seq: i64, m: &NewMessage) -> ConversationMessage {
    ConversationMessage {
        id: m.id,
        conversation_id,
        seq,
        role: m.role,
        content: m.content.clone(),
        metadata: m.metadata.clone(),
        created_at: m.created_at,
    }
}

impl ConversationRepository for InMemoryConversationRepository {
    async fn get_conversation(&self, id: &Uuid) -> Result<Option<Conversation>, RepositoryError> {
        let guard = self.entries.lock().await;
        Ok(guard.get(id).and_then(|e| e.conversation.clone()))
    }

    async fn append_turn(
        &self,
        conversation: &Conversation,
        messages: &[NewMessage],
    ) -> Result<Vec<ConversationMessage>, RepositoryError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        let mut guard = self.entries.lock().await;
        let entry = guard.entry(conversation.id).or_default();
        let stored = entry
            .conversation
            .get_or_insert_with(|| conversation.clone());
        if !stored.status.accepts_turns() {
            return Err(RepositoryError::Conflict(format!(
                "conversation {} is {}",
                stored.id, stored.status
            )));
        }

        let base = entry.messages.last().map_or(0, |m| m.seq);
        let appended: Vec<ConversationMessage> = messages
            .iter()
            .enumerate()
            .map(|(i, m)| materialize(conversation.id, base + 1 + i as i64, m))
            .collect();
        entry.messages.extend(appended.iter().cloned());
        Ok(appended)
    }

    async fn read_recent_history(
        &self,
        conversation_id: &Uuid,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, RepositoryError> {
        let guard = self.entries.lock().await;
        Ok(guard
            .get(conversation_id)
            .map(|e| {
                let skip = e.messages.len().saturating_sub(limit);
                e.messages[skip..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn list_messages(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Vec<ConversationMessage>, RepositoryError> {
        let guard = self.entries.lock().await;
        Ok(guard
            .get(conversation_id)
            .map(|e| e.messages.clone())
            .unwrap_or_default())
    }

    async fn update_conversation_status(
        &self,
        conversation_id: &Uuid,
        expected: ConversationStatus,
        next: ConversationStatus,
        note: &NewMessage,
    ) -> Result<Conversation, RepositoryError> {
        let mut guard = self.entries.lock().await;
        let entry = guard
            .get_mut(conversation_id)
            .ok_or(RepositoryError::NotFound)?;
        let conversation = entry
            .conversation
            .as_mut()
            .ok_or(RepositoryError::NotFound)?;
        if conversation.status != expected {
            return Err(RepositoryError::Conflict(format!(
                "expected status {expected}, found {}",
                conversation.status
            )));
        }
        conversation.status = next;
        if next.is_terminal() {
            conversation.ended_at = Some(Utc::now());
        }
        let updated = conversation.clone();

        let seq = entry.messages.last().map_or(0, |m| m.seq) + 1;
        entry.messages.push(materialize(*conversation_id, seq, note));
        Ok(updated)
    }

    async fn annotate_conversation(
        &self,
        conversation_id: &Uuid,
        key: &str,
        value: serde_json::Value,
    ) -> Result<Conversation, RepositoryError> {
        let mut guard = self.entries.lock().await;
        let conversation = guard
            .get_mut(conversation_id)
            .and_then(|e| e.conversation.as_mut())
            .ok_or(RepositoryError::NotFound)?;
        conversation.metadata.insert(key.to_string(), value);
        Ok(conversation.clone())
    }
}
