//! Process configuration resolved from the environment.
//!
//! All environment access happens here, once, at process start. The
//! resulting [`Config`] is passed by reference to the store and the
//! backup tool, which keeps both independently testable with injected
//! paths and flags.

use std::fmt;
use std::path::PathBuf;

use sqlx::sqlite::SqliteConnectOptions;
use zeroize::ZeroizeOnDrop;

use crate::error::StoreError;

pub const ENV_DB_PATH: &str = "TRADEX_DB_PATH";
pub const ENV_RUNTIME: &str = "TRADEX_ENV";
pub const ENV_USE_SQLCIPHER: &str = "TRADEX_USE_SQLCIPHER";
pub const ENV_DB_KEY: &str = "TRADEX_DB_KEY";
pub const ENV_AUDIT_RETENTION: &str = "AUDIT_LOG_RETENTION_DAYS";

const DEFAULT_AUDIT_RETENTION_DAYS: u32 = 30;

/// Runtime environment. Anything other than `production` is treated as
/// development (demo seeding enabled).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnv {
    Development,
    Production,
}

impl RuntimeEnv {
    pub fn is_production(&self) -> bool {
        matches!(self, RuntimeEnv::Production)
    }
}

/// Database encryption key. Zeroized on drop, redacted in Debug and
/// Display so it can never leak through logs or error messages.
#[derive(Clone, ZeroizeOnDrop)]
pub struct DbKey(String);

impl DbKey {
    pub fn new(key: String) -> Self {
        Self(key)
    }

    /// Expose the raw key. Use only to build the `PRAGMA key` statement.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DbKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***REDACTED***")
    }
}

impl fmt::Display for DbKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***REDACTED***")
    }
}

/// At-rest encryption backend. Owns everything that differs between the
/// plain and SQLCipher cases so no conditionals leak into store or
/// backup code.
#[derive(Debug, Clone)]
pub enum Encryption {
    Plain,
    SqlCipher { key: DbKey },
}

impl Encryption {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Encryption::SqlCipher { .. })
    }

    /// Decorate connection options with the encryption pragmas.
    ///
    /// SQLCipher requires `PRAGMA key` before any other statement
    /// touches the database, so this must run before journal-mode or
    /// foreign-key pragmas are added to the options.
    pub fn apply(&self, opts: SqliteConnectOptions) -> SqliteConnectOptions {
        match self {
            Encryption::Plain => opts,
            Encryption::SqlCipher { key } => {
                let quoted = format!("'{}'", key.expose().replace('\'', "''"));
                opts.pragma("key", quoted)
            }
        }
    }

    /// Whether on-disk files are expected to start with the cleartext
    /// SQLite magic. SQLCipher encrypts the header as well.
    pub fn expects_plain_header(&self) -> bool {
        matches!(self, Encryption::Plain)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub env: RuntimeEnv,
    pub encryption: Encryption,
    pub audit_retention_days: u32,
}

impl Config {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    /// Fails with [`StoreError::Config`] before any database access when
    /// encryption is requested without a key.
    pub fn from_lookup<F>(get: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = match get(ENV_DB_PATH) {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => default_db_path()?,
        };

        let env = match get(ENV_RUNTIME) {
            Some(value) if value.trim().eq_ignore_ascii_case("production") => {
                RuntimeEnv::Production
            }
            _ => RuntimeEnv::Development,
        };

        let encryption = if get(ENV_USE_SQLCIPHER).as_deref().map(str::trim) == Some("1") {
            let key = get(ENV_DB_KEY)
                .filter(|key| !key.is_empty())
                .ok_or_else(|| {
                    StoreError::Config(format!(
                        "{ENV_DB_KEY} must be set when {ENV_USE_SQLCIPHER}=1"
                    ))
                })?;
            Encryption::SqlCipher {
                key: DbKey::new(key),
            }
        } else {
            Encryption::Plain
        };

        let audit_retention_days = match get(ENV_AUDIT_RETENTION) {
            Some(value) => value.trim().parse().map_err(|_| {
                StoreError::Config(format!(
                    "{ENV_AUDIT_RETENTION} must be a number of days, got {value:?}"
                ))
            })?,
            None => DEFAULT_AUDIT_RETENTION_DAYS,
        };

        Ok(Self {
            db_path,
            env,
            encryption,
            audit_retention_days,
        })
    }

    /// Plain development configuration for an explicit database path.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            env: RuntimeEnv::Development,
            encryption: Encryption::Plain,
            audit_retention_days: DEFAULT_AUDIT_RETENTION_DAYS,
        }
    }
}

/// Default database location: `~/.tradex/users.db`.
fn default_db_path() -> Result<PathBuf, StoreError> {
    let dirs = directories::BaseDirs::new()
        .ok_or_else(|| StoreError::Config("cannot determine home directory".into()))?;
    Ok(dirs.home_dir().join(".tradex").join("users.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        move |key| map.get(key).map(|value| value.to_string())
    }

    #[test]
    fn default_path_points_into_home() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert!(config.db_path.ends_with(".tradex/users.db"));
        assert_eq!(config.env, RuntimeEnv::Development);
        assert!(!config.encryption.is_encrypted());
        assert_eq!(config.audit_retention_days, 30);
    }

    #[test]
    fn db_path_override_wins() {
        let config =
            Config::from_lookup(lookup(&[(ENV_DB_PATH, "/tmp/custom/users.db")])).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/custom/users.db"));
    }

    #[test]
    fn production_is_case_insensitive() {
        let config = Config::from_lookup(lookup(&[(ENV_RUNTIME, "Production")])).unwrap();
        assert!(config.env.is_production());

        let config = Config::from_lookup(lookup(&[(ENV_RUNTIME, "staging")])).unwrap();
        assert!(!config.env.is_production());
    }

    #[test]
    fn sqlcipher_without_key_is_a_config_error() {
        let err = Config::from_lookup(lookup(&[(ENV_USE_SQLCIPHER, "1")])).unwrap_err();
        match err {
            StoreError::Config(message) => assert!(message.contains(ENV_DB_KEY)),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn sqlcipher_with_key_enables_encryption() {
        let config = Config::from_lookup(lookup(&[
            (ENV_USE_SQLCIPHER, "1"),
            (ENV_DB_KEY, "hunter2"),
        ]))
        .unwrap();
        assert!(config.encryption.is_encrypted());
        assert!(!config.encryption.expects_plain_header());
    }

    #[test]
    fn bad_retention_is_a_config_error() {
        let err = Config::from_lookup(lookup(&[(ENV_AUDIT_RETENTION, "soon")])).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn db_key_is_redacted_in_debug_output() {
        let key = DbKey::new("hunter2".into());
        let debug = format!("{key:?}");
        assert_eq!(debug, "***REDACTED***");
        assert!(!debug.contains("hunter2"));

        let encryption = Encryption::SqlCipher { key };
        assert!(!format!("{encryption:?}").contains("hunter2"));
    }
}
