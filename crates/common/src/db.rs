use std::time::Duration;

use anyhow::Context;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::AppConfig;

/// Open the PostgreSQL pool and bring the schema up to date.
///
/// Pool size comes from `AppConfig::db_max_connections` (default 20).
pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .context("connecting to PostgreSQL")?;
    tracing::info!(
        max_connections = config.db_max_connections,
        "Connected to PostgreSQL"
    );

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("applying migrations")?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}
