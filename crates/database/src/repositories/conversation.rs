use crate::pool::DbPool;
use crate::repositories::utils::{map_db_error, owner_columns, owner_from_row};
use crate::retry_db;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use services::common::RepositoryError;
use services::conversations::ports::{
    Conversation, ConversationId, ConversationRepository, ConversationUpdate, GenerationSettings,
    GuestSessionId, NewConversation, Owner, SyncSummary, UserId, DEFAULT_TITLE,
};
use tokio_postgres::Row;
use tracing::debug;
use uuid::Uuid;

pub struct PgConversationRepository {
    pool: DbPool,
}

impl PgConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_conversation(&self, row: Row) -> Result<Conversation> {
        let id: Uuid = row.try_get("id")?;
        let settings: serde_json::Value = row.try_get("settings")?;

        Ok(Conversation {
            id: id.into(),
            owner: owner_from_row(&row)?,
            title: row.try_get("title")?,
            model: row.try_get("model")?,
            settings: serde_json::from_value::<GenerationSettings>(settings)
                .context("Stored conversation settings are malformed")?,
            is_active: row.try_get("is_active")?,
            share_id: row.try_get("share_id")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn create(&self, owner: Owner, params: NewConversation) -> Result<Conversation> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let (owner_user_id, guest_session_id) = owner_columns(&owner);
        let title = params.title.unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let settings = serde_json::to_value(&params.settings)?;
        let metadata = params.metadata.unwrap_or_else(|| serde_json::json!({}));

        let row = client
            .query_one(
                r#"
            INSERT INTO conversations (
                id, owner_user_id, guest_session_id, title, model,
                settings, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING *
            "#,
                &[
                    &id,
                    &owner_user_id,
                    &guest_session_id,
                    &title,
                    &params.model,
                    &settings,
                    &metadata,
                    &now,
                ],
            )
            .await
            .context("Failed to create conversation")?;

        debug!("Created conversation: {} for {}", ConversationId(id), owner);
        self.row_to_conversation(row)
    }

    async fn get_by_id(&self, id: ConversationId) -> Result<Option<Conversation>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let row = client
            .query_opt("SELECT * FROM conversations WHERE id = $1", &[&id.0])
            .await
            .context("Failed to query conversation")?;

        row.map(|row| self.row_to_conversation(row)).transpose()
    }

    async fn list_by_owner(
        &self,
        owner: &Owner,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let rows = match owner {
            Owner::User(user) => {
                client
                    .query(
                        r#"
                    SELECT * FROM conversations
                    WHERE owner_user_id = $1
                    ORDER BY updated_at DESC
                    LIMIT $2 OFFSET $3
                    "#,
                        &[&user.0, &limit, &offset],
                    )
                    .await
            }
            Owner::Guest(guest) => {
                client
                    .query(
                        r#"
                    SELECT * FROM conversations
                    WHERE guest_session_id = $1
                    ORDER BY updated_at DESC
                    LIMIT $2 OFFSET $3
                    "#,
                        &[&guest.as_str(), &limit, &offset],
                    )
                    .await
            }
        }
        .context("Failed to list conversations")?;

        rows.into_iter()
            .map(|row| self.row_to_conversation(row))
            .collect()
    }

    async fn update(
        &self,
        id: ConversationId,
        update: ConversationUpdate,
    ) -> Result<Option<Conversation>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let settings = update
            .settings
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let row = client
            .query_opt(
                r#"
            UPDATE conversations
            SET title = COALESCE($2, title),
                model = COALESCE($3, model),
                settings = COALESCE($4, settings),
                is_active = COALESCE($5, is_active),
                metadata = COALESCE($6, metadata),
                updated_at = $7
            WHERE id = $1
            RETURNING *
            "#,
                &[
                    &id.0,
                    &update.title,
                    &update.model,
                    &settings,
                    &update.is_active,
                    &update.metadata,
                    &Utc::now(),
                ],
            )
            .await
            .context("Failed to update conversation")?;

        match row {
            Some(row) => {
                debug!("Updated conversation: {}", id);
                Ok(Some(self.row_to_conversation(row)?))
            }
            None => Ok(None),
        }
    }

    async fn assign_share_id(
        &self,
        id: ConversationId,
        share_id: String,
    ) -> Result<Option<Conversation>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let row = client
            .query_opt(
                r#"
            UPDATE conversations
            SET share_id = COALESCE(share_id, $2)
            WHERE id = $1
            RETURNING *
            "#,
                &[&id.0, &share_id],
            )
            .await
            .context("Failed to assign share id")?;

        row.map(|row| self.row_to_conversation(row)).transpose()
    }

    async fn get_by_share_id(&self, share_id: &str) -> Result<Option<Conversation>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let row = client
            .query_opt(
                "SELECT * FROM conversations WHERE share_id = $1",
                &[&share_id],
            )
            .await
            .context("Failed to query shared conversation")?;

        row.map(|row| self.row_to_conversation(row)).transpose()
    }

    async fn transfer_guest_ownership(
        &self,
        guest: &GuestSessionId,
        user: &UserId,
    ) -> Result<SyncSummary> {
        let summary = retry_db!("transfer_guest_ownership", {
            let mut client = self
                .pool
                .get()
                .await
                .context("Failed to get database connection")
                .map_err(RepositoryError::PoolError)?;

            let transaction = client.transaction().await.map_err(map_db_error)?;

            let conversations = transaction
                .execute(
                    r#"
                    UPDATE conversations
                    SET owner_user_id = $1, guest_session_id = NULL, updated_at = NOW()
                    WHERE guest_session_id = $2
                    "#,
                    &[&user.0, &guest.as_str()],
                )
                .await
                .map_err(map_db_error)?;

            let messages = transaction
                .execute(
                    r#"
                    UPDATE messages
                    SET owner_user_id = $1, guest_session_id = NULL
                    WHERE guest_session_id = $2
                    "#,
                    &[&user.0, &guest.as_str()],
                )
                .await
                .map_err(map_db_error)?;

            transaction.commit().await.map_err(map_db_error)?;

            Ok::<SyncSummary, RepositoryError>(SyncSummary {
                conversations,
                messages,
            })
        })?;

        debug!(
            "Transferred {} conversations and {} messages from guest {} to user {}",
            summary.conversations, summary.messages, guest, user
        );
        Ok(summary)
    }

    async fn list_stale_guest_conversations(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ConversationId>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let rows = client
            .query(
                r#"
            SELECT id FROM conversations
            WHERE guest_session_id IS NOT NULL AND updated_at < $1
            ORDER BY updated_at
            "#,
                &[&cutoff],
            )
            .await
            .context("Failed to list stale guest conversations")?;

        rows.into_iter()
            .map(|row| Ok(ConversationId(row.try_get("id")?)))
            .collect()
    }
}
