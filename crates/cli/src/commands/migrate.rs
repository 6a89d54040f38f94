//! Database migration command.
//!
//! # Environment Variables
//!
//! - `WISHBOX_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`)

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;

/// Run pending migrations against the configured database.
///
/// # Errors
///
/// Returns an error if the connection string is missing, the database is
/// unreachable, or a migration fails.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let database_url = database_url()?;

    tracing::info!("Connecting to database...");
    let pool = PgPool::connect(database_url.expose_secret()).await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}

pub(crate) fn database_url() -> Result<SecretString, Box<dyn std::error::Error>> {
    std::env::var("WISHBOX_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| "WISHBOX_DATABASE_URL not set".into())
}
