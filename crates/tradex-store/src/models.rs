//! Row types for the Tradex database.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Account role stored in the `role` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Owner,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "Owner",
            Role::User => "User",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            value if value.eq_ignore_ascii_case("owner") => Ok(Role::Owner),
            value if value.eq_ignore_ascii_case("user") => Ok(Role::User),
            other => Err(StoreError::Config(format!(
                "unknown role {other:?}, expected Owner or User"
            ))),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub username: String,
    pub hashed_password: String,
    pub role: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LoginRecord {
    pub id: i64,
    pub username: String,
    pub device_id: String,
    pub login_time: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DeviceUsage {
    pub username: String,
    pub device_id: String,
    pub quote_count: i64,
    pub first_access: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub actor: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub action: Option<String>,
    pub object: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
}
