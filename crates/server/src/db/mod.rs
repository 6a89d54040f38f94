//! Database connection management for the Wishbox `PostgreSQL` database.
//!
//! # Tables
//!
//! - `users`, `user_emails` - identity (emails carry the verified/primary invariant)
//! - `lists`, `list_admins`, `list_group_shares` - lists, co-editors, group shares
//! - `wishes`, `list_wishes` - wishes and their per-list association metadata
//! - `gift_groups`, `group_members` - permission-scoping groups
//! - `reservations` - live claims; UNIQUE(wish_id) enforces at-most-one
//! - `api_tokens` - personal API tokens (prefix plaintext, secret digested)
//! - `rate_limit_windows` - fixed-window counters
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p wishbox-cli -- migrate
//! ```

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Open a `PostgreSQL` pool sized for the single-binary deployment.
///
/// # Errors
///
/// Returns `sqlx::Error` when the initial connection cannot be established
/// within the acquire timeout.
pub async fn create_pool(database_url: &SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
