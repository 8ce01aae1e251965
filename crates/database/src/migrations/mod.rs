use crate::pool::DbPool;
use anyhow::{Context, Result};
use tracing::info;

mod embedded {
    refinery::embed_migrations!("src/migrations/sql");
}

/// Apply pending schema migrations
pub async fn run(pool: &DbPool) -> Result<()> {
    let mut client = pool
        .get()
        .await
        .context("Failed to get database connection for migrations")?;

    let report = embedded::migrations::runner()
        .run_async(&mut **client)
        .await
        .context("Failed to run migrations")?;

    for migration in report.applied_migrations() {
        info!("Applied migration: {}", migration.name());
    }

    info!("All migrations completed successfully");
    Ok(())
}
