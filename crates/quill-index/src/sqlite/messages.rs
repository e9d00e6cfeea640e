use quill_llm::{Message, Role};

use super::SqliteStore;
use crate::BoxFuture;
use crate::error::IndexError;
use crate::history::{ConversationId, ConversationStore, MessageId};

fn parse_role(s: &str) -> Role {
    match s {
        "assistant" => Role::Assistant,
        "system" => Role::System,
        _ => Role::User,
    }
}

#[must_use]
pub fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

impl SqliteStore {
    /// Create a new conversation and return its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create_conversation(&self) -> Result<ConversationId, IndexError> {
        let row: (ConversationId,) =
            sqlx::query_as("INSERT INTO conversations DEFAULT VALUES RETURNING id")
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    /// Save a message to the given conversation and return the message ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails, including when the conversation does not exist.
    pub async fn save_message(
        &self,
        conversation_id: ConversationId,
        role: Role,
        content: &str,
    ) -> Result<MessageId, IndexError> {
        let row: (MessageId,) = sqlx::query_as(
            "INSERT INTO messages (conversation_id, role, content) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(conversation_id)
        .bind(role_str(role))
        .bind(content)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Load the most recent messages for a conversation, up to `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn load_history(
        &self,
        conversation_id: ConversationId,
        limit: u32,
    ) -> Result<Vec<Message>, IndexError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT role, content FROM (\
                SELECT role, content, id FROM messages \
                WHERE conversation_id = ? \
                ORDER BY id DESC \
                LIMIT ?\
             ) ORDER BY id ASC",
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(role, content)| Message {
                role: parse_role(&role),
                content,
            })
            .collect())
    }
}

impl ConversationStore for SqliteStore {
    fn create_conversation(&self) -> BoxFuture<'_, Result<ConversationId, IndexError>> {
        Box::pin(SqliteStore::create_conversation(self))
    }

    fn append_message(
        &self,
        conversation: ConversationId,
        message: Message,
    ) -> BoxFuture<'_, Result<MessageId, IndexError>> {
        Box::pin(async move {
            self.save_message(conversation, message.role, &message.content)
                .await
        })
    }

    fn fetch_history(
        &self,
        conversation: ConversationId,
        limit: u32,
    ) -> BoxFuture<'_, Result<Vec<Message>, IndexError>> {
        Box::pin(self.load_history(conversation, limit))
    }
}
