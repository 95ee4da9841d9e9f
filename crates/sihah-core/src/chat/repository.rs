//! ConversationRepository trait definition.

use sihah_types::chat::{Conversation, ConversationMessage, ConversationStatus, NewMessage};
use sihah_types::error::RepositoryError;
use uuid::Uuid;

/// Repository trait for conversations and their append-only messages.
///
/// Implementations live in sihah-infra (e.g., `SqliteConversationRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
///
/// Message order is defined by the store-assigned `seq`, which is strictly
/// increasing within a conversation. Messages are never reordered, edited,
/// or deleted.
pub trait ConversationRepository: Send + Sync {
    /// Get a conversation by its unique ID.
    fn get_conversation(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Conversation>, RepositoryError>> + Send;

    /// Append the messages of one turn atomically: either all are stored or
    /// none are.
    ///
    /// `conversation` is inserted first if it does not exist yet (the first
    /// turn creates it). Fails with `Conflict` if the stored conversation is
    /// not `Active`.
    fn append_turn(
        &self,
        conversation: &Conversation,
        messages: &[NewMessage],
    ) -> impl std::future::Future<Output = Result<Vec<ConversationMessage>, RepositoryError>> + Send;

    /// The most recent `limit` messages, oldest first.
    fn read_recent_history(
        &self,
        conversation_id: &Uuid,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationMessage>, RepositoryError>> + Send;

    /// The full transcript, oldest first.
    fn list_messages(
        &self,
        conversation_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationMessage>, RepositoryError>> + Send;

    /// Move a conversation from `expected` to `next` and append `note` in
    /// the same transaction. Sets `ended_at` when `next` is terminal.
    ///
    /// Fails with `NotFound` for an unknown conversation and `Conflict` if
    /// the stored status is no longer `expected`.
    fn update_conversation_status(
        &self,
        conversation_id: &Uuid,
        expected: ConversationStatus,
        next: ConversationStatus,
        note: &NewMessage,
    ) -> impl std::future::Future<Output = Result<Conversation, RepositoryError>> + Send;

    /// Set one metadata key. Allowed in every status.
    fn annotate_conversation(
        &self,
        conversation_id: &Uuid,
        key: &str,
        value: serde_json::Value,
    ) -> impl std::future::Future<Output = Result<Conversation, RepositoryError>> + Send;
}
