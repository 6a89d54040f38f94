//! Development seed data.
//!
//! Inserts a couple of demo users with lists and wishes so a fresh local
//! database has something to click on. Idempotent only in the sense that it
//! always creates new rows; run it against a scratch database.

use secrecy::ExposeSecret;
use sqlx::PgPool;

use super::migrate::database_url;

/// Seed the database with demo data.
///
/// # Errors
///
/// Returns an error if the connection string is missing or an insert fails.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let database_url = database_url()?;
    let pool = PgPool::connect(database_url.expose_secret()).await?;

    tracing::info!("Seeding demo data...");

    let (alice, bob) = seed_users(&pool).await?;
    let list_id = seed_list(&pool, alice, "Alice's birthday").await?;
    seed_wishes(&pool, alice, list_id).await?;

    tracing::info!(alice = alice, bob = bob, list = list_id, "Demo data seeded");
    Ok(())
}

async fn seed_users(pool: &PgPool) -> Result<(i64, i64), sqlx::Error> {
    let alice: (i64,) =
        sqlx::query_as("INSERT INTO users (display_name) VALUES ('Alice') RETURNING id")
            .fetch_one(pool)
            .await?;
    let bob: (i64,) =
        sqlx::query_as("INSERT INTO users (display_name) VALUES ('Bob') RETURNING id")
            .fetch_one(pool)
            .await?;
    for (user_id, email) in [(alice.0, "alice@example.com"), (bob.0, "bob@example.com")] {
        sqlx::query(
            "INSERT INTO user_emails (user_id, email, verified, is_primary) \
             VALUES ($1, $2, TRUE, TRUE)",
        )
        .bind(user_id)
        .bind(email)
        .execute(pool)
        .await?;
    }
    Ok((alice.0, bob.0))
}

async fn seed_list(pool: &PgPool, owner_id: i64, name: &str) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO lists (owner_id, name, visibility, share_token) \
         VALUES ($1, $2, 'public', md5(random()::text)) RETURNING id",
    )
    .bind(owner_id)
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

async fn seed_wishes(pool: &PgPool, owner_id: i64, list_id: i64) -> Result<(), sqlx::Error> {
    let wishes = [
        ("Wool socks", Some(("12.50", "USD"))),
        ("Espresso grinder", Some(("249.00", "EUR"))),
        ("A handwritten letter", None),
    ];
    // Sort keys spaced out so reorders have room between neighbors.
    let sort_keys = ["i", "r", "v"];
    for ((title, price), sort_key) in wishes.into_iter().zip(sort_keys) {
        let wish: (i64,) = sqlx::query_as(
            "INSERT INTO wishes (owner_id, title, price_amount, price_currency) \
             VALUES ($1, $2, $3::numeric, $4) RETURNING id",
        )
        .bind(owner_id)
        .bind(title)
        .bind(price.map(|(amount, _)| amount))
        .bind(price.map(|(_, currency)| currency))
        .fetch_one(pool)
        .await?;
        sqlx::query(
            "INSERT INTO list_wishes (list_id, wish_id, sort_key) VALUES ($1, $2, $3)",
        )
        .bind(list_id)
        .bind(wish.0)
        .bind(sort_key)
        .execute(pool)
        .await?;
    }
    Ok(())
}
