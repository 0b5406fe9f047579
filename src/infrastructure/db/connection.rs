use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;
use std::time::Duration;

use crate::domain::error::{AppError, Result};

const SCHEMA: &str = include_str!("../../resources/schema.sql");

pub async fn init_db(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| AppError::Store(format!("Failed to parse database URL: {}", e)))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .map_err(|e| AppError::Store(format!("Failed to connect to database: {}", e)))?;

    apply_schema(&pool).await?;
    Ok(pool)
}

/// In-memory database for tests. A single connection kept alive for the
/// pool's lifetime, otherwise every checkout would see a fresh empty DB.
pub async fn init_memory_db() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| AppError::Store(format!("Failed to open in-memory database: {}", e)))?;

    apply_schema(&pool).await?;
    Ok(pool)
}

async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Executed as one multi-statement script; comments and semicolons inside
    // them are the driver's problem, not ours.
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| AppError::Store(format!("Failed to apply schema: {}", e)))?;
    Ok(())
}
