use std::time::Duration;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::AppConfig;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const PING_TIMEOUT: Duration = Duration::from_secs(1);

fn pool_options() -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(ACQUIRE_TIMEOUT)
}

/// Opens the pool and applies migrations. An unreachable database is logged
/// and replaced by a lazy pool so the service still starts and reports
/// itself as disconnected.
pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    match pool_options().connect(&config.database_url).await {
        Ok(pool) => {
            tracing::info!("database connection successful");
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                tracing::warn!(error = %e, "migration failed; continuing");
            }
            Ok(pool)
        }
        Err(e) => {
            tracing::error!("Database connection failed: {e}");
            pool_options()
                .connect_lazy(&config.database_url)
                .context("parse database url")
        }
    }
}

pub async fn ping(pool: &PgPool) -> bool {
    matches!(
        tokio::time::timeout(PING_TIMEOUT, sqlx::query("SELECT 1").execute(pool)).await,
        Ok(Ok(_))
    )
}
