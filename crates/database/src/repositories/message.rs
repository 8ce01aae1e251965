use crate::pool::DbPool;
use crate::repositories::utils::{map_db_error, owner_from_row};
use crate::retry_db;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use services::common::RepositoryError;
use services::conversations::ports::{
    AttachmentRef, ConversationId, HistoryStore, Message, MessageId, MessageRole, NewMessage,
};
use tokio_postgres::Row;
use tracing::debug;
use uuid::Uuid;

/// Postgres-backed message history.
///
/// `created_at` is assigned on insert while the conversation row is locked, so
/// it is strictly increasing within a conversation even under concurrent appends.
pub struct PgMessageRepository {
    pool: DbPool,
}

impl PgMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_message(&self, row: Row) -> Result<Message> {
        let id: Uuid = row.try_get("id")?;
        let conversation_id: Uuid = row.try_get("conversation_id")?;
        let role: String = row.try_get("role")?;
        let attachments: serde_json::Value = row.try_get("attachments")?;

        Ok(Message {
            id: id.into(),
            conversation_id: conversation_id.into(),
            role: role.parse::<MessageRole>()?,
            content: row.try_get("content")?,
            model: row.try_get("model")?,
            owner: owner_from_row(&row)?,
            attachments: serde_json::from_value::<Vec<AttachmentRef>>(attachments)
                .context("Stored message attachments are malformed")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl HistoryStore for PgMessageRepository {
    async fn append(&self, message: NewMessage) -> Result<Message> {
        let attachments = serde_json::to_value(&message.attachments)?;

        let row = retry_db!("append_message", {
            let mut client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            let transaction = client.transaction().await.map_err(map_db_error)?;

            // The lock also pins the owner a guest sync could otherwise move mid-write
            let Some(locked) = transaction
                .query_opt(
                    "SELECT owner_user_id, guest_session_id FROM conversations WHERE id = $1 FOR UPDATE",
                    &[&message.conversation_id.0],
                )
                .await
                .map_err(map_db_error)?
            else {
                return Err(RepositoryError::NotFound(
                    message.conversation_id.to_string(),
                ));
            };
            let owner_user_id: Option<Uuid> = locked
                .try_get("owner_user_id")
                .map_err(|e| RepositoryError::DataConversionError(e.into()))?;
            let guest_session_id: Option<String> = locked
                .try_get("guest_session_id")
                .map_err(|e| RepositoryError::DataConversionError(e.into()))?;

            let row = transaction
                .query_one(
                    r#"
                    INSERT INTO messages (
                        id, conversation_id, role, content, model,
                        owner_user_id, guest_session_id, attachments, created_at, updated_at
                    )
                    SELECT $1, $2, $3, $4, $5, $6, $7, $8, ts, ts
                    FROM (
                        SELECT GREATEST(
                            clock_timestamp(),
                            COALESCE(MAX(created_at) + INTERVAL '1 microsecond', clock_timestamp())
                        ) AS ts
                        FROM messages
                        WHERE conversation_id = $2
                    ) AS next
                    RETURNING *
                    "#,
                    &[
                        &message.id.0,
                        &message.conversation_id.0,
                        &message.role.as_str(),
                        &message.content,
                        &message.model,
                        &owner_user_id,
                        &guest_session_id,
                        &attachments,
                    ],
                )
                .await
                .map_err(map_db_error)?;

            let created_at: DateTime<Utc> = row
                .try_get("created_at")
                .map_err(|e| RepositoryError::DataConversionError(e.into()))?;

            transaction
                .execute(
                    "UPDATE conversations SET updated_at = $2 WHERE id = $1",
                    &[&message.conversation_id.0, &created_at],
                )
                .await
                .map_err(map_db_error)?;

            transaction.commit().await.map_err(map_db_error)?;

            Ok::<Row, RepositoryError>(row)
        })?;

        debug!(
            "Appended {} message {} to conversation {}",
            message.role.as_str(),
            message.id,
            message.conversation_id
        );
        self.row_to_message(row)
    }

    async fn list_ordered(&self, conversation_id: ConversationId) -> Result<Vec<Message>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let rows = client
            .query(
                "SELECT * FROM messages WHERE conversation_id = $1 ORDER BY created_at ASC",
                &[&conversation_id.0],
            )
            .await
            .context("Failed to list messages")?;

        rows.into_iter()
            .map(|row| self.row_to_message(row))
            .collect()
    }

    async fn list_before(
        &self,
        conversation_id: ConversationId,
        before: MessageId,
    ) -> Result<Vec<Message>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        // An unknown `before` makes the subquery NULL and the comparison false
        let rows = client
            .query(
                r#"
            SELECT * FROM messages
            WHERE conversation_id = $1
              AND created_at < (
                  SELECT created_at FROM messages WHERE id = $2 AND conversation_id = $1
              )
            ORDER BY created_at ASC
            "#,
                &[&conversation_id.0, &before.0],
            )
            .await
            .context("Failed to list messages before target")?;

        rows.into_iter()
            .map(|row| self.row_to_message(row))
            .collect()
    }

    async fn overwrite(
        &self,
        message_id: MessageId,
        content: String,
        model: String,
    ) -> Result<Option<Message>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let row = client
            .query_opt(
                r#"
            WITH updated AS (
                UPDATE messages
                SET content = $2, model = $3, updated_at = clock_timestamp()
                WHERE id = $1
                RETURNING *
            ), touched AS (
                UPDATE conversations
                SET updated_at = clock_timestamp()
                WHERE id IN (SELECT conversation_id FROM updated)
            )
            SELECT * FROM updated
            "#,
                &[&message_id.0, &content, &model],
            )
            .await
            .context("Failed to overwrite message")?;

        match row {
            Some(row) => {
                debug!("Overwrote message {}", message_id);
                Ok(Some(self.row_to_message(row)?))
            }
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, message_id: MessageId) -> Result<Option<Message>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let row = client
            .query_opt("SELECT * FROM messages WHERE id = $1", &[&message_id.0])
            .await
            .context("Failed to query message")?;

        row.map(|row| self.row_to_message(row)).transpose()
    }

    async fn find_latest(&self, conversation_id: ConversationId) -> Result<Option<Message>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let row = client
            .query_opt(
                r#"
            SELECT * FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
                &[&conversation_id.0],
            )
            .await
            .context("Failed to query latest message")?;

        row.map(|row| self.row_to_message(row)).transpose()
    }

    async fn delete_conversation_cascade(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<u64>> {
        let removed = retry_db!("delete_conversation_cascade", {
            let mut client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            let transaction = client.transaction().await.map_err(map_db_error)?;

            let messages = transaction
                .execute(
                    "DELETE FROM messages WHERE conversation_id = $1",
                    &[&conversation_id.0],
                )
                .await
                .map_err(map_db_error)?;

            let conversations = transaction
                .execute(
                    "DELETE FROM conversations WHERE id = $1",
                    &[&conversation_id.0],
                )
                .await
                .map_err(map_db_error)?;

            transaction.commit().await.map_err(map_db_error)?;

            Ok::<Option<u64>, RepositoryError>((conversations > 0).then_some(messages))
        })?;

        if let Some(messages) = removed {
            debug!(
                "Deleted conversation {} with {} messages",
                conversation_id, messages
            );
        }
        Ok(removed)
    }
}
