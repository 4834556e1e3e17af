use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use concierge_core::domain::conversation::ConversationId;
use concierge_core::domain::message::{MessageContext, MessageRole, StoredMessage};

use super::listing::parse_timestamp;
use super::{MessageRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_message(row: &SqliteRow) -> Result<StoredMessage, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let conversation_id: String =
        row.try_get("conversation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role: String = row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let content: String =
        row.try_get("content").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let context_json: String =
        row.try_get("context_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let role = MessageRole::parse(&role)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown message role `{role}`")))?;
    let context: MessageContext = serde_json::from_str(&context_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid message context: {e}")))?;

    Ok(StoredMessage {
        id,
        conversation_id: ConversationId(conversation_id),
        role,
        content,
        context,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn append(&self, message: StoredMessage) -> Result<(), RepositoryError> {
        let context_json = serde_json::to_string(&message.context)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO conversation_message (id, conversation_id, role, content, context_json,
                                               created_at, seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6,
                     (SELECT COALESCE(MAX(seq), 0) + 1 FROM conversation_message
                      WHERE conversation_id = ?2))",
        )
        .bind(&message.id)
        .bind(&message.conversation_id.0)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(context_json)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_assistant(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<StoredMessage>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, conversation_id, role, content, context_json, created_at
             FROM conversation_message
             WHERE conversation_id = ? AND role = 'assistant'
             ORDER BY seq DESC
             LIMIT 1",
        )
        .bind(&conversation_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_message).transpose()
    }

    async fn recent(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, role, content, context_json, created_at
             FROM conversation_message
             WHERE conversation_id = ?
             ORDER BY seq DESC
             LIMIT ?",
        )
        .bind(&conversation_id.0)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows.iter().map(row_to_message).collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }
}
