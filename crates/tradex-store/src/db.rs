//! Database handle over SQLite via sqlx.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use tracing::debug;

use crate::config::{Config, Encryption};
use crate::error::StoreError;
use crate::permissions;
use crate::seed;

/// Central store handle. Cheap to clone (the pool is an Arc internally).
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    config: Config,
}

/// Connection options shared by the store and the backup tool.
///
/// The encryption pragmas are applied before journal-mode and
/// foreign-key setup: SQLCipher requires `PRAGMA key` to be the first
/// statement that touches the database.
pub(crate) fn connect_options(
    encryption: &Encryption,
    path: &Path,
    create_if_missing: bool,
) -> SqliteConnectOptions {
    let opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create_if_missing);
    encryption
        .apply(opts)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
}

impl Store {
    /// Open (or create) the database described by `config`.
    ///
    /// Creates the parent directory (owner-only), runs all pending
    /// migrations, seeds demo users outside production, and forces
    /// owner-only permissions on the database file and its sidecars.
    pub async fn open(config: &Config) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| permissions::classify_io(parent, e))?;
                permissions::enforce_owner_only_dir(parent)?;
            }
        }

        let opts = connect_options(&config.encryption, &config.db_path, true);
        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        seed::seed_demo_users(&pool, config.env).await?;
        permissions::enforce_db_family(&config.db_path)?;

        debug!(path = %config.db_path.display(), "store open");
        Ok(Self {
            pool,
            config: config.clone(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Close the pool. Required before handing the database file to
    /// [`crate::BackupTool::restore`].
    pub async fn close(self) {
        self.pool.close().await;
    }
}
