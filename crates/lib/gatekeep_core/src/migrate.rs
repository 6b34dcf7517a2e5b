//! Database migration support.
//!
//! Embeds and runs the SQL migrations under `gatekeep_core/migrations/`.

use sqlx::PgPool;

/// Run all embedded migrations against the given pool.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
