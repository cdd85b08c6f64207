//! Demo data inserted on first run outside production.

use sqlx::SqlitePool;
use tracing::info;

use crate::config::RuntimeEnv;
use crate::error::StoreError;
use crate::users;

const DEMO_USERS: [(&str, &str, &str); 2] = [
    ("demo@fixhub.es", "demo123!", "Owner"),
    ("demo2@fixhub.es", "demo456!", "User"),
];

/// Insert the demo accounts unless running in production. Usernames
/// that already exist are left untouched, so repeated opens are safe.
pub(crate) async fn seed_demo_users(
    pool: &SqlitePool,
    env: RuntimeEnv,
) -> Result<(), StoreError> {
    if env.is_production() {
        return Ok(());
    }

    for (username, password, role) in DEMO_USERS {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;
        if exists.is_some() {
            continue;
        }

        let hashed = users::hash_password(password)?;
        sqlx::query("INSERT INTO users (username, hashed_password, role) VALUES (?, ?, ?)")
            .bind(username)
            .bind(&hashed)
            .bind(role)
            .execute(pool)
            .await?;
        info!(username, "seeded demo user");
    }

    Ok(())
}
