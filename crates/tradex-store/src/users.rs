//! User accounts, login tracking and device usage.

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

use crate::db::Store;
use crate::error::StoreError;
use crate::models::{DeviceUsage, Role, User};

const MIN_PASSWORD_LEN: usize = 8;

const COMMON_PASSWORDS: [&str; 6] = [
    "password",
    "123456",
    "123456789",
    "qwerty",
    "abc123",
    "letmein",
];

/// Basic password policy: length, not a known-common password, and a
/// mix of character classes.
pub fn validate_password(password: &str) -> Result<(), StoreError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(StoreError::InvalidPassword(format!(
            "must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        return Err(StoreError::InvalidPassword(
            "too common, pick something else".into(),
        ));
    }
    if password.chars().all(|c| c.is_ascii_digit())
        || password.chars().all(|c| c.is_alphabetic())
    {
        return Err(StoreError::InvalidPassword(
            "must mix letters with digits or symbols".into(),
        ));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, hashed: &str) -> Result<bool, StoreError> {
    let parsed = PasswordHash::new(hashed).map_err(|e| StoreError::Hash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

impl Store {
    /// Add a user with a policy-checked, argon2-hashed password.
    /// A duplicate username surfaces as a database error.
    pub async fn add_user(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<(), StoreError> {
        validate_password(password)?;
        let hashed = hash_password(password)?;
        sqlx::query("INSERT INTO users (username, hashed_password, role) VALUES (?, ?, ?)")
            .bind(username)
            .bind(&hashed)
            .bind(role.as_str())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn get_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT username, hashed_password, role FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(self.pool())
        .await?;
        Ok(user)
    }

    pub async fn all_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT username, hashed_password, role FROM users ORDER BY username",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(users)
    }

    pub async fn record_login(&self, username: &str, device_id: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO logins (username, device_id) VALUES (?, ?)")
            .bind(username)
            .bind(device_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn increment_device_usage(
        &self,
        username: &str,
        device_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO device_usage (username, device_id, quote_count) \
             VALUES (?, ?, 1) \
             ON CONFLICT(username, device_id) \
             DO UPDATE SET quote_count = quote_count + 1",
        )
        .bind(username)
        .bind(device_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn device_usage(
        &self,
        username: &str,
        device_id: &str,
    ) -> Result<Option<DeviceUsage>, StoreError> {
        let usage = sqlx::query_as::<_, DeviceUsage>(
            "SELECT username, device_id, quote_count, first_access \
             FROM device_usage WHERE username = ? AND device_id = ?",
        )
        .bind(username)
        .bind(device_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_rejects_short_passwords() {
        assert!(matches!(
            validate_password("abc1!"),
            Err(StoreError::InvalidPassword(_))
        ));
    }

    #[test]
    fn policy_rejects_common_and_single_class_passwords() {
        assert!(validate_password("Password").is_err());
        assert!(validate_password("4815162342").is_err());
        assert!(validate_password("onlyletters").is_err());
    }

    #[test]
    fn policy_accepts_mixed_passwords() {
        assert!(validate_password("demo123!").is_ok());
    }

    #[test]
    fn hash_then_verify_round_trips() {
        let hashed = hash_password("demo123!").unwrap();
        assert!(verify_password("demo123!", &hashed).unwrap());
        assert!(!verify_password("wrong-pass1", &hashed).unwrap());
    }
}
