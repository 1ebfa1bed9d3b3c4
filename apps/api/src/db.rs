use std::time::Duration;

use anyhow::{bail, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;

/// Tables this service reads or writes. Migrations are owned by the web app.
const REQUIRED_TABLES: &[&str] = &["user_profiles", "job_applications", "proposal_history"];

/// Creates the PostgreSQL pool and checks that the expected tables exist.
pub async fn create_pool(config: &Config) -> Result<PgPool> {
    info!(
        max_connections = config.database_max_connections,
        "Connecting to PostgreSQL..."
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;

    verify_schema(&pool).await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

async fn verify_schema(pool: &PgPool) -> Result<()> {
    let present: Vec<String> = sqlx::query_scalar(
        "SELECT table_name::text FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_name = ANY($1)",
    )
    .bind(REQUIRED_TABLES)
    .fetch_all(pool)
    .await?;

    let missing = missing_tables(&present);
    if !missing.is_empty() {
        bail!("Database is missing required tables: {}", missing.join(", "));
    }
    Ok(())
}

fn missing_tables(present: &[String]) -> Vec<&'static str> {
    REQUIRED_TABLES
        .iter()
        .copied()
        .filter(|t| !present.iter().any(|p| p == t))
        .collect()
}
