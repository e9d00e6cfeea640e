//! Narrow conversation history contract used by the assistant.

use quill_llm::Message;
use serde::{Deserialize, Serialize};

use crate::BoxFuture;
use crate::error::IndexError;

/// Strongly typed wrapper for conversation row IDs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct ConversationId(pub i64);

/// Strongly typed wrapper for message row IDs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct MessageId(pub i64);

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Append-only message log grouped by conversation.
///
/// Record lifecycle (titles, cascade deletes, timestamps) belongs to the implementation.
pub trait ConversationStore: Send + Sync {
    fn create_conversation(&self) -> BoxFuture<'_, Result<ConversationId, IndexError>>;

    fn append_message(
        &self,
        conversation: ConversationId,
        message: Message,
    ) -> BoxFuture<'_, Result<MessageId, IndexError>>;

    /// The most recent `limit` messages, oldest first.
    fn fetch_history(
        &self,
        conversation: ConversationId,
        limit: u32,
    ) -> BoxFuture<'_, Result<Vec<Message>, IndexError>>;
}
