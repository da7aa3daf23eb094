use anyhow::Context;

use std::path::Path;

use market_server::{db, DatabaseEndpoint, StoreTuning};

/// Applies the migrations found in `migrations` to the primary database.
pub async fn migrate(
    endpoint: &DatabaseEndpoint,
    tuning: &StoreTuning,
    migrations: &Path,
) -> anyhow::Result<()> {
    let pool = db::connect(endpoint, tuning)
        .await
        .context("Couldn't connect to primary database")?;
    let migrator = sqlx::migrate::Migrator::new(migrations)
        .await
        .with_context(|| format!("Couldn't load migrations from {}", migrations.display()))?;
    let res = migrator.run(&pool).await.context("Couldn't run migrations");
    pool.close().await;
    res
}
