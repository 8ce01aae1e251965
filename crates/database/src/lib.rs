pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, DbPool};
pub use repositories::{PgConversationRepository, PgMessageRepository};

use anyhow::Result;
use std::sync::Arc;

/// Postgres storage for conversations and their message history
pub struct Database {
    pub conversations: Arc<PgConversationRepository>,
    pub messages: Arc<PgMessageRepository>,
    pool: DbPool,
}

impl Database {
    pub fn new(pool: DbPool) -> Self {
        Self {
            conversations: Arc::new(PgConversationRepository::new(pool.clone())),
            messages: Arc::new(PgMessageRepository::new(pool.clone())),
            pool,
        }
    }

    pub async fn from_config(config: &config::DatabaseConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run(&self.pool).await
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}
