//! Postgres persistence for recongrid: row models and repositories.

pub mod models;
pub mod repositories;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Default connection-pool size for the batch passes; a pass touches one
/// job at a time, so the pool stays small.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Connect to the database and run pending migrations.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(DEFAULT_MAX_CONNECTIONS)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Cheap connectivity probe used at pass start; an unreachable store is an
/// unrecoverable configuration error for a batch pass.
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
